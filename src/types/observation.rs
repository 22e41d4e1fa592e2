//! Typed GSOD daily observations as produced by [`crate::decode_line`].

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The unit system every quantity of an observation is expressed in.
///
/// A single observation never mixes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitSystem {
    /// Kelvin, Pascal, meters and meters per second.
    #[default]
    Si,
    /// The archive's own units: degrees Fahrenheit, millibars, miles, knots and inches.
    Native,
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Si => write!(f, "SI"),
            UnitSystem::Native => write!(f, "native"),
        }
    }
}

/// The observation date, either parsed or kept as the raw `YYYYMMDD` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationDate {
    Parsed(NaiveDate),
    Raw(String),
}

impl ObservationDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ObservationDate::Parsed(date) => Some(*date),
            ObservationDate::Raw(_) => None,
        }
    }
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationDate::Parsed(date) => write!(f, "{}", date.format("%Y%m%d")),
            ObservationDate::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

/// The `FRSHTT` indicator block: whether each phenomenon occurred during the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeatherIndicators {
    pub fog: bool,
    /// Rain or drizzle.
    pub rain: bool,
    /// Snow or ice pellets.
    pub snow_ice: bool,
    pub hail: bool,
    pub thunder: bool,
    /// Tornado or funnel cloud.
    pub tornado: bool,
}

/// One decoded line of a GSOD year file.
///
/// Quantities the station did not report are `None`. Units follow [`GsodObservation::units`]:
///
/// | field | [`UnitSystem::Si`] | [`UnitSystem::Native`] |
/// |---|---|---|
/// | temperatures | K | °F |
/// | pressures | Pa | mbar |
/// | visibility | m | mi |
/// | wind speeds | m/s | kn |
/// | precipitation, snow depth | m | in |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsodObservation {
    pub date: ObservationDate,
    pub units: UnitSystem,
    /// Mean temperature (`TEMP`).
    pub temperature: Option<f64>,
    pub temperature_count: Option<u32>,
    /// Mean dew point (`DEWP`).
    pub dew_point: Option<f64>,
    pub dew_point_count: Option<u32>,
    /// Mean sea level pressure (`SLP`).
    pub sea_level_pressure: Option<f64>,
    pub sea_level_pressure_count: Option<u32>,
    /// Mean station pressure (`STP`).
    pub station_pressure: Option<f64>,
    pub station_pressure_count: Option<u32>,
    /// Mean visibility (`VISIB`).
    pub visibility: Option<f64>,
    pub visibility_count: Option<u32>,
    /// Mean wind speed (`WDSP`).
    pub wind_speed: Option<f64>,
    pub wind_speed_count: Option<u32>,
    /// Maximum sustained wind speed (`MXSPD`).
    pub max_wind_speed: Option<f64>,
    /// Maximum wind gust (`GUST`).
    pub gust: Option<f64>,
    /// Maximum temperature (`MAX`). The reporting window varies by region, so this is not
    /// always the maximum of the calendar day.
    pub max_temperature: Option<f64>,
    /// Minimum temperature (`MIN`), same caveat as [`GsodObservation::max_temperature`].
    pub min_temperature: Option<f64>,
    /// Total precipitation (`PRCP`); `0.0` includes traces.
    pub precipitation: Option<f64>,
    /// Snow depth (`SNDP`). Most stations leave this unreported on snow-free days.
    pub snow_depth: Option<f64>,
    pub indicators: WeatherIndicators,
}

/// All observations of one station for one calendar year.
#[derive(Debug, Clone, PartialEq)]
pub struct StationYear {
    pub year: i32,
    pub observations: Vec<GsodObservation>,
}

impl StationYear {
    /// Fraction of the year's days that have an observation.
    pub fn completeness(&self) -> f64 {
        self.observations.len() as f64 / days_in_year(self.year) as f64
    }
}

/// Number of days in `year`, honoring the Gregorian leap-year rules.
pub fn days_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 31)
        .map(|d| d.ordinal())
        .unwrap_or(365)
}
