//! Decoder for GSOD (Global Summary of the Day) records.
//!
//! Each line of a GSOD year file holds one station-day as whitespace separated fields:
//!
//! ```text
//! STN--- WBAN   YEARMODA    TEMP       DEWP      SLP        STP       VISIB      WDSP     MXSPD   GUST    MAX     MIN   PRCP   SNDP   FRSHTT
//! 725300 94846  20140615    71.2 24    58.1 24  1013.5 24   990.5 24   10.0 24    8.7 24   15.0   22.9    82.0*   61.0   0.00G 999.9  010010
//! ```
//!
//! Quantities may carry a trailing flag character noting how they were derived, and
//! unreported quantities are written as `99.99`, `999.9` or `9999.9`.

use crate::observations::error::DecodeError;
use crate::types::observation::{GsodObservation, ObservationDate, UnitSystem, WeatherIndicators};
use chrono::NaiveDate;

/// Tokens that follow the two station identifiers.
const FIELD_COUNT: usize = 20;

/// Characters that may trail a quantity to annotate its provenance.
pub const FLAG_CHARS: [char; 10] = ['*', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I'];

/// Literal values the archive uses for "not reported".
pub const MISSING_VALUES: [&str; 3] = ["99.99", "999.9", "9999.9"];

const MILE_M: f64 = 1609.344;
const INCH_M: f64 = 0.0254;
const KNOT_M_S: f64 = 1852.0 / 3600.0;
const MILLIBAR_PA: f64 = 100.0;

/// How [`decode_line`] presents its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub units: UnitSystem,
    /// Parse the `YYYYMMDD` token into a date; otherwise it is kept verbatim.
    pub parse_dates: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            units: UnitSystem::Si,
            parse_dates: true,
        }
    }
}

impl DecodeOptions {
    pub fn new(units: UnitSystem, parse_dates: bool) -> Self {
        Self { units, parse_dates }
    }
}

/// Removes every trailing flag character from `token`.
///
/// ```
/// use isd_gsod::strip_flags;
///
/// assert_eq!(strip_flags("82.0*"), "82.0");
/// assert_eq!(strip_flags("0.00G"), "0.00");
/// assert_eq!(strip_flags("12.5"), "12.5");
/// ```
pub fn strip_flags(token: &str) -> &str {
    token.trim_end_matches(|c: char| FLAG_CHARS.contains(&c))
}

/// Decodes one line of a GSOD year file.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the line has too few fields, a malformed date, a
/// non-numeric quantity or count, or an indicator block that is not six characters long.
///
/// # Examples
///
/// ```
/// use isd_gsod::{decode_line, DecodeOptions, UnitSystem};
///
/// let line = "725300 94846  20140615    71.2 24    58.1 24  1013.5 24   990.5 24   \
///             10.0 24    8.7 24   15.0   22.9    82.0*   61.0   0.00G 999.9  010010";
/// let native = decode_line(line, &DecodeOptions::new(UnitSystem::Native, true)).unwrap();
/// assert_eq!(native.temperature, Some(71.2));
/// assert_eq!(native.max_temperature, Some(82.0));
/// assert_eq!(native.snow_depth, None);
/// assert!(native.indicators.rain && native.indicators.thunder);
/// ```
pub fn decode_line(line: &str, options: &DecodeOptions) -> Result<GsodObservation, DecodeError> {
    // The leading STN and WBAN identifiers are known to the caller already.
    let fields: Vec<&str> = line.split_whitespace().skip(2).collect();
    if fields.len() < FIELD_COUNT {
        return Err(DecodeError::TooFewFields {
            expected: FIELD_COUNT,
            found: fields.len(),
        });
    }

    let date = if options.parse_dates {
        let date = NaiveDate::parse_from_str(fields[0], "%Y%m%d").map_err(|source| {
            DecodeError::InvalidDate {
                token: fields[0].to_string(),
                source,
            }
        })?;
        ObservationDate::Parsed(date)
    } else {
        ObservationDate::Raw(fields[0].to_string())
    };

    let si = options.units == UnitSystem::Si;
    Ok(GsodObservation {
        date,
        units: options.units,
        temperature: quantity(fields[1], "TEMP", si, fahrenheit_to_kelvin)?,
        temperature_count: count_field(fields[2], "TEMP_COUNT")?,
        dew_point: quantity(fields[3], "DEWP", si, fahrenheit_to_kelvin)?,
        dew_point_count: count_field(fields[4], "DEWP_COUNT")?,
        sea_level_pressure: quantity(fields[5], "SLP", si, millibars_to_pascals)?,
        sea_level_pressure_count: count_field(fields[6], "SLP_COUNT")?,
        station_pressure: quantity(fields[7], "STP", si, millibars_to_pascals)?,
        station_pressure_count: count_field(fields[8], "STP_COUNT")?,
        visibility: quantity(fields[9], "VISIB", si, miles_to_meters)?,
        visibility_count: count_field(fields[10], "VISIB_COUNT")?,
        wind_speed: quantity(fields[11], "WDSP", si, knots_to_meters_per_second)?,
        wind_speed_count: count_field(fields[12], "WDSP_COUNT")?,
        max_wind_speed: quantity(fields[13], "MXSPD", si, knots_to_meters_per_second)?,
        gust: quantity(fields[14], "GUST", si, knots_to_meters_per_second)?,
        max_temperature: quantity(fields[15], "MAX", si, fahrenheit_to_kelvin)?,
        min_temperature: quantity(fields[16], "MIN", si, fahrenheit_to_kelvin)?,
        precipitation: quantity(fields[17], "PRCP", si, inches_to_meters)?,
        snow_depth: quantity(fields[18], "SNDP", si, inches_to_meters)?,
        indicators: indicators(fields[19])?,
    })
}

/// Decodes every record of a GSOD year file, skipping blank lines and the column header.
///
/// # Errors
///
/// The first malformed record aborts decoding with [`DecodeError::Line`], carrying the
/// 1-based line number.
pub fn decode_year_text(
    text: &str,
    options: &DecodeOptions,
) -> Result<Vec<GsodObservation>, DecodeError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("STN")
        })
        .map(|(index, line)| {
            decode_line(line, options).map_err(|e| DecodeError::Line {
                line: index + 1,
                source: Box::new(e),
            })
        })
        .collect()
}

fn fahrenheit_to_kelvin(fahrenheit: f64) -> f64 {
    (fahrenheit + 459.67) * 5.0 / 9.0
}

fn millibars_to_pascals(millibars: f64) -> f64 {
    millibars * MILLIBAR_PA
}

fn miles_to_meters(miles: f64) -> f64 {
    miles * MILE_M
}

fn inches_to_meters(inches: f64) -> f64 {
    inches * INCH_M
}

fn knots_to_meters_per_second(knots: f64) -> f64 {
    knots * KNOT_M_S
}

/// A float field, converted to SI when asked to. Absent values stay absent.
fn quantity(
    token: &str,
    field: &'static str,
    si: bool,
    to_si: fn(f64) -> f64,
) -> Result<Option<f64>, DecodeError> {
    Ok(float_field(token, field)?.map(|v| if si { to_si(v) } else { v }))
}

fn float_field(token: &str, field: &'static str) -> Result<Option<f64>, DecodeError> {
    let value = strip_flags(token.trim());
    if value.is_empty() || MISSING_VALUES.contains(&value) {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(DecodeError::InvalidNumber {
            field,
            token: token.to_string(),
        }),
    }
}

fn count_field(token: &str, field: &'static str) -> Result<Option<u32>, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    token
        .parse::<u32>()
        .map(Some)
        .map_err(|source| DecodeError::InvalidCount {
            field,
            token: token.to_string(),
            source,
        })
}

fn indicators(block: &str) -> Result<WeatherIndicators, DecodeError> {
    let flags: Vec<bool> = block.chars().map(|c| c == '1').collect();
    let &[fog, rain, snow_ice, hail, thunder, tornado] = flags.as_slice() else {
        return Err(DecodeError::IndicatorLength {
            block: block.to_string(),
            found: flags.len(),
        });
    };
    Ok(WeatherIndicators {
        fog,
        rain,
        snow_ice,
        hail,
        thunder,
        tornado,
    })
}
