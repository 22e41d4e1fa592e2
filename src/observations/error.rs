use std::path::PathBuf;
use thiserror::Error;

/// A GSOD line that does not follow the fixed record layout.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Expected {expected} fields after the station identifiers, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("Invalid date '{token}' (expected YYYYMMDD)")]
    InvalidDate {
        token: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Field {field} is not a number: '{token}'")]
    InvalidNumber { field: &'static str, token: String },

    #[error("Observation count {field} is not an integer: '{token}'")]
    InvalidCount {
        field: &'static str,
        token: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Indicator block '{block}' has {found} characters, expected 6")]
    IndicatorLength { block: String, found: usize },

    #[error("Malformed record on line {line}")]
    Line {
        line: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

/// Failure to obtain the raw text of a station-year, from the cache or the archive.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    // Covers errors during download stream processing and decompression
    #[error("Data download or decompression failed for {0}")]
    DownloadIo(String, #[source] std::io::Error),

    #[error("Downloaded data from {0} is not valid text")]
    InvalidText(String, #[source] std::string::FromUtf8Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
