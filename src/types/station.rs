//! Defines the data structures describing stations of the Integrated Surface Database (ISD)
//! registry, together with the identifiers used to address their GSOD files.

use haversine::{distance, Location as HaversineLocation, Units};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use isd_gsod::LatLon;
///
/// let calgary = LatLon(51.0253, -114.0499);
/// assert_eq!(calgary.0, 51.0253); // Latitude
/// assert_eq!(calgary.1, -114.0499); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

/// A single station of the ISD registry.
///
/// Records are created once when the registry is loaded and never change afterwards.
/// Every record held by a [`crate::StationRegistry`] has both coordinates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StationRecord {
    /// Air Force (USAF) station identifier, if assigned.
    pub usaf: Option<u32>,
    /// NCDC WBAN station identifier, if assigned.
    pub wban: Option<u32>,
    /// Station name, e.g. "CALGARY INTL CS".
    pub name: String,
    /// FIPS country code, if specified.
    pub country: Option<String>,
    /// State code; only set for US stations.
    pub state: Option<String>,
    /// ICAO airport code, if the station is at an airport.
    pub icao: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Elevation above sea level in meters, if known.
    pub elevation_m: Option<f64>,
    /// Beginning of the period of record, as `YYYYMMDD`.
    pub record_begin: u32,
    /// End of the period of record, as `YYYYMMDD`. Gaps inside the period are possible.
    pub record_end: u32,
}

impl StationRecord {
    /// The identifier pair used to name this station's GSOD files.
    pub fn station_id(&self) -> StationId {
        StationId {
            usaf: self.usaf,
            wban: self.wban,
        }
    }

    pub fn location(&self) -> LatLon {
        LatLon(self.latitude, self.longitude)
    }

    /// Calendar years covered by the period of record (inclusive).
    pub fn years(&self) -> RangeInclusive<i32> {
        (self.record_begin / 10_000) as i32..=(self.record_end / 10_000) as i32
    }

    /// Great-circle distance from this station to `location`, in kilometers.
    pub fn distance_km(&self, location: LatLon) -> f64 {
        distance(
            HaversineLocation {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            HaversineLocation {
                latitude: location.0,
                longitude: location.1,
            },
            Units::Kilometers,
        )
    }
}

fn fmt_optional<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for StationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ISD station {} (country {}, USAF {}, WBAN {}) at ({}, {}), data from {} to {}",
            self.name,
            fmt_optional(&self.country),
            fmt_optional(&self.usaf),
            fmt_optional(&self.wban),
            self.latitude,
            self.longitude,
            self.record_begin / 10_000,
            self.record_end / 10_000,
        )
    }
}

/// The `USAF-WBAN` pair that names a station in the GSOD archive.
///
/// Unassigned identifiers are written with the archive's placeholders (`999999` for USAF,
/// `99999` for WBAN), zero padded to the archive's fixed widths.
///
/// ```
/// use isd_gsod::StationId;
///
/// let id = StationId { usaf: Some(713930), wban: None };
/// assert_eq!(id.to_string(), "713930-99999");
///
/// let id = StationId { usaf: Some(722950), wban: Some(3017) };
/// assert_eq!(id.to_string(), "722950-03017");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId {
    pub usaf: Option<u32>,
    pub wban: Option<u32>,
}

const UNASSIGNED_USAF: u32 = 999_999;
const UNASSIGNED_WBAN: u32 = 99_999;

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06}-{:05}",
            self.usaf.unwrap_or(UNASSIGNED_USAF),
            self.wban.unwrap_or(UNASSIGNED_WBAN)
        )
    }
}
