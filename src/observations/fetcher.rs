use crate::observations::error::FetchError;
use crate::types::station::StationId;
use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::{fs, task};
use tokio_util::io::StreamReader;

/// Root of the GSOD archive; year directories live directly below it.
pub const DEFAULT_BASE_URL: &str = "https://www1.ncdc.noaa.gov/pub/data/gsod";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Supplies the raw text of one station-year, preferring the local cache and downloading
/// from the GSOD archive on a miss.
#[derive(Debug, Clone)]
pub struct YearTextFetcher {
    cache_dir: PathBuf,
    base_url: String,
    download_client: Client,
}

impl YearTextFetcher {
    pub fn new(cache_dir: &Path, base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let download_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(YearTextFetcher {
            cache_dir: cache_dir.to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
            download_client,
        })
    }

    /// Where the text for `station` and `year` is cached.
    pub fn cache_path(&self, station: StationId, year: i32) -> PathBuf {
        self.cache_dir
            .join("gsod")
            .join(year.to_string())
            .join(format!("{}.op", station))
    }

    /// Returns the decompressed text for `station` and `year`.
    ///
    /// A non-empty cached copy is returned as is. Otherwise the year file is downloaded,
    /// written to the cache and then returned.
    pub async fn fetch_year_text(
        &self,
        station: StationId,
        year: i32,
    ) -> Result<String, FetchError> {
        let cache_path = self.cache_path(station, year);

        if let Ok(metadata) = fs::metadata(&cache_path).await {
            if metadata.len() > 0 {
                info!("Cache hit for station {} year {} at {:?}", station, year, cache_path);
                return fs::read_to_string(&cache_path)
                    .await
                    .map_err(|e| FetchError::CacheRead(cache_path.clone(), e));
            }
        }

        debug!("Cache miss for station {} year {}. Downloading.", station, year);
        let text = self.download(station, year).await?;

        let year_dir = cache_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cache_dir.clone());
        fs::create_dir_all(&year_dir)
            .await
            .map_err(|e| FetchError::CacheDirCreation(year_dir.clone(), e))?;
        Self::cache_text(text.clone(), &year_dir, &cache_path).await?;
        info!("Cached station {} year {} to {:?}", station, year, cache_path);

        Ok(text)
    }

    /// Downloads and decompresses the gzip year file.
    async fn download(&self, station: StationId, year: i32) -> Result<String, FetchError> {
        let url = format!("{}/{}/{}-{}.op.gz", self.base_url, year, station, year);
        info!("Downloading data from {}", url);

        let response = self
            .download_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(url.clone(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    FetchError::HttpStatus {
                        url,
                        status,
                        source: e,
                    }
                } else {
                    FetchError::NetworkRequest(url, e)
                });
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let stream_reader = StreamReader::new(stream);
        let mut decoder = GzipDecoder::new(stream_reader);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .await
            .map_err(|e| FetchError::DownloadIo(url.clone(), e))?;
        info!(
            "Downloaded and decompressed {} bytes for station {} year {}",
            decompressed.len(),
            station,
            year
        );
        String::from_utf8(decompressed).map_err(|e| FetchError::InvalidText(url, e))
    }

    /// Writes through a temporary file in the same directory so readers never observe a
    /// partially written cache entry.
    async fn cache_text(text: String, dir: &Path, path: &Path) -> Result<(), FetchError> {
        let dir = dir.to_path_buf();
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || {
            let mut temp_file = NamedTempFile::new_in(&dir)
                .map_err(|e| FetchError::CacheWrite(path_buf.clone(), e))?;
            temp_file
                .write_all(text.as_bytes())
                .map_err(|e| FetchError::CacheWrite(path_buf.clone(), e))?;
            temp_file
                .persist(&path_buf)
                .map_err(|e| FetchError::CacheWrite(path_buf.clone(), e.error))?;
            Ok::<(), FetchError>(())
        })
        .await??;
        Ok(())
    }
}
