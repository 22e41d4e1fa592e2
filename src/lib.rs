mod error;
mod gsod;
mod observations;
mod stations;
mod types;
mod utils;

pub use error::GsodError;
pub use gsod::*;

pub use observations::decoder::{
    decode_line, decode_year_text, strip_flags, DecodeOptions, FLAG_CHARS, MISSING_VALUES,
};
pub use observations::error::{DecodeError, FetchError};
pub use observations::fetcher::{YearTextFetcher, DEFAULT_BASE_URL, DEFAULT_FETCH_TIMEOUT};

pub use stations::error::LocateStationError;
pub use stations::registry::StationRegistry;
pub use stations::resolver::{
    StationResolver, DEFAULT_MATCH_MAX, DEFAULT_MIN_RECENT_DATA, DEFAULT_WIDENING_FACTOR,
};
pub use stations::spatial_index::{Neighbor, SpatialIndex};

pub use types::observation::*;
pub use types::station::*;

pub use utils::get_cache_dir;
