use crate::observations::error::{DecodeError, FetchError};
use crate::stations::error::LocateStationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GsodError {
    #[error(transparent)]
    LocateStation(#[from] LocateStationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution,
}
