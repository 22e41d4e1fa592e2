//! This module provides the main entry point of the crate. A [`Gsod`] client owns the
//! station registry, the spatial index over it and the year-file fetcher, and is only handed
//! out once all of them are fully built.

use crate::error::GsodError;
use crate::observations::decoder::{decode_year_text, DecodeOptions};
use crate::observations::fetcher::{YearTextFetcher, DEFAULT_BASE_URL, DEFAULT_FETCH_TIMEOUT};
use crate::stations::error::LocateStationError;
use crate::stations::registry::StationRegistry;
use crate::stations::resolver::{
    StationResolver, DEFAULT_MATCH_MAX, DEFAULT_MIN_RECENT_DATA, DEFAULT_WIDENING_FACTOR,
};
use crate::types::observation::StationYear;
use crate::types::station::{LatLon, StationRecord};
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::{bon, Builder};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings for [`Gsod::new`].
///
/// # Examples
///
/// ```
/// use isd_gsod::GsodConfig;
/// use std::time::Duration;
///
/// let config = GsodConfig::builder()
///     .registry_path("data/isd-history-cleaned.tsv")
///     .cache_dir("/tmp/gsod")
///     .fetch_timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.fetch_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct GsodConfig {
    /// The tab separated ISD station history export.
    #[builder(into)]
    pub registry_path: PathBuf,
    /// Where the registry cache and downloaded year files are kept. Defaults to the
    /// system cache directory.
    #[builder(into)]
    pub cache_dir: Option<PathBuf>,
    /// Timeout for a single year-file download.
    #[builder(default = DEFAULT_FETCH_TIMEOUT)]
    pub fetch_timeout: Duration,
    /// Root URL of the GSOD archive.
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
}

/// Client for locating stations and reading their daily summaries.
///
/// The station lookup is synchronous and side-effect free; only the methods that touch the
/// year files are `async`. The client is `Send + Sync` and can be shared behind an `Arc`.
///
/// # Examples
///
/// ```no_run
/// # use isd_gsod::{Gsod, GsodConfig, GsodError, LatLon, DecodeOptions};
/// # #[tokio::main]
/// # async fn main() -> Result<(), GsodError> {
/// let config = GsodConfig::builder()
///     .registry_path("isd-history-cleaned.tsv")
///     .build();
/// let client = Gsod::new(config).await?;
///
/// let station = client
///     .nearest_station()
///     .location(LatLon(51.0253, -114.0499))
///     .min_recent_data(20150000)
///     .call()?;
/// println!("{}", station);
///
/// let year = client.station_year(&station, 2016, &DecodeOptions::default()).await?;
/// println!("{} days, {:.0}% complete", year.observations.len(), year.completeness() * 100.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Gsod {
    resolver: StationResolver,
    fetcher: YearTextFetcher,
}

#[bon]
impl Gsod {
    /// Loads the registry, builds the spatial index and prepares the fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`GsodError::CacheDirResolution`] or [`GsodError::CacheDirCreation`] when
    /// no usable cache directory is available, [`GsodError::LocateStation`] when the
    /// registry cannot be read or cached, and [`GsodError::Fetch`] if the HTTP client
    /// cannot be set up.
    pub async fn new(config: GsodConfig) -> Result<Self, GsodError> {
        let cache_dir = match config.cache_dir {
            Some(dir) => dir,
            None => get_cache_dir().ok_or(GsodError::CacheDirResolution)?,
        };
        ensure_cache_dir_exists(&cache_dir)
            .await
            .map_err(|e| GsodError::CacheDirCreation(cache_dir.clone(), e))?;

        let registry = StationRegistry::load(&config.registry_path, &cache_dir).await?;
        let resolver =
            tokio::task::spawn_blocking(move || StationResolver::new(Arc::new(registry)))
                .await
                .map_err(LocateStationError::from)?;
        info!("Indexed {} stations", resolver.index().len());

        let fetcher = YearTextFetcher::new(&cache_dir, &config.base_url, config.fetch_timeout)?;
        Ok(Self { resolver, fetcher })
    }

    /// Assembles a client from parts that were built elsewhere.
    pub fn from_parts(resolver: StationResolver, fetcher: YearTextFetcher) -> Self {
        Self { resolver, fetcher }
    }

    pub fn registry(&self) -> &StationRegistry {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &StationResolver {
        &self.resolver
    }

    /// Finds the nearest station that has reported after a given date.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.location(LatLon)`: **Required.** The point to search around.
    /// * `.min_recent_data(u32)`: Optional. The station's record must end after this
    ///   `YYYYMMDD` date. Defaults to `20140000`; `0` disables the check.
    /// * `.match_max(usize)`: Optional. Size of the first candidate window. Defaults to `100`.
    /// * `.widening_factor(usize)`: Optional. Window growth between passes. Defaults to `10`.
    ///
    /// # Errors
    ///
    /// Returns [`GsodError::LocateStation`] wrapping
    /// [`LocateStationError::NoStationFound`] if no station qualifies.
    #[builder]
    pub fn nearest_station(
        &self,
        location: LatLon,
        #[builder(default = DEFAULT_MIN_RECENT_DATA)] min_recent_data: u32,
        #[builder(default = DEFAULT_MATCH_MAX)] match_max: usize,
        #[builder(default = DEFAULT_WIDENING_FACTOR)] widening_factor: usize,
    ) -> Result<StationRecord, GsodError> {
        let station = self.resolver.resolve(
            location.0,
            location.1,
            min_recent_data,
            match_max,
            widening_factor,
        )?;
        Ok(station.clone())
    }

    /// Raw text of one station-year, from the cache or the archive.
    pub async fn year_text(&self, station: &StationRecord, year: i32) -> Result<String, GsodError> {
        Ok(self.fetcher.fetch_year_text(station.station_id(), year).await?)
    }

    /// Fetches and decodes one station-year.
    pub async fn station_year(
        &self,
        station: &StationRecord,
        year: i32,
        options: &DecodeOptions,
    ) -> Result<StationYear, GsodError> {
        let text = self.year_text(station, year).await?;
        let observations = decode_year_text(&text, options)?;
        Ok(StationYear { year, observations })
    }

    /// Fetches the raw text of every year in the station's period of record.
    ///
    /// Years that cannot be fetched, typically because the archive has no file for them,
    /// are logged and left out of the result.
    pub async fn station_history(&self, station: &StationRecord) -> BTreeMap<i32, String> {
        let mut history = BTreeMap::new();
        for year in station.years() {
            match self.year_text(station, year).await {
                Ok(text) => {
                    history.insert(year, text);
                }
                Err(e) => warn!(
                    "Skipping year {} for station {}: {}",
                    year,
                    station.station_id(),
                    e
                ),
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::fetcher::tests::{gzip, serve, YEAR_TEXT};
    use crate::types::observation::UnitSystem;

    const REGISTRY: &str = "\
713930\t99999\tCALGARY INTL CS\tCA\t\t\t51.1\t-114.0\t1084.1\t20150101\t20170101
712350\t99999\tCALGARY OLD\tCA\t\t\t51.03\t-114.05\t1084.0\t19530101\t19951231
711230\t99999\tEDMONTON\tCA\t\t\tCYEG\t53.3\t-113.6\t723.0\t19610101\t20170510
";

    async fn client(base_url: &str) -> (Gsod, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry_path = dir.path().join("isd-history.tsv");
        std::fs::write(&registry_path, REGISTRY).expect("write registry");
        let config = GsodConfig::builder()
            .registry_path(registry_path)
            .cache_dir(dir.path().join("cache"))
            .base_url(base_url)
            .build();
        let gsod = Gsod::new(config).await.expect("client");
        (gsod, dir)
    }

    #[test]
    fn test_client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Gsod>();
    }

    #[test]
    fn test_config_defaults() {
        let config = GsodConfig::builder().registry_path("stations.tsv").build();
        assert_eq!(config.registry_path, PathBuf::from("stations.tsv"));
        assert_eq!(config.cache_dir, None);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_nearest_station_defaults_and_overrides() -> Result<(), GsodError> {
        let (gsod, _dir) = client("http://127.0.0.1:9").await;
        // The malformed EDMONTON row (extra column) is skipped.
        assert_eq!(gsod.registry().len(), 2);

        let station = gsod
            .nearest_station()
            .location(LatLon(51.0253, -114.0499))
            .min_recent_data(20_150_000)
            .call()?;
        assert_eq!(station.name, "CALGARY INTL CS");

        let station = gsod
            .nearest_station()
            .location(LatLon(51.0253, -114.0499))
            .min_recent_data(0)
            .match_max(1)
            .call()?;
        assert_eq!(station.name, "CALGARY OLD");

        let result = gsod
            .nearest_station()
            .location(LatLon(51.0253, -114.0499))
            .min_recent_data(20_990_000)
            .call();
        assert!(matches!(
            result,
            Err(GsodError::LocateStation(LocateStationError::NoStationFound { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_station_year_and_history() -> Result<(), GsodError> {
        let base_url = serve("/2016/713930-99999-2016.op.gz", gzip(YEAR_TEXT).await).await;
        let (gsod, dir) = client(&base_url).await;
        let station = gsod
            .nearest_station()
            .location(LatLon(51.0253, -114.0499))
            .call()?;

        let year = gsod
            .station_year(&station, 2016, &DecodeOptions::new(UnitSystem::Native, true))
            .await?;
        assert_eq!(year.year, 2016);
        assert_eq!(year.observations.len(), 2);
        assert_eq!(year.observations[0].temperature, Some(12.1));
        assert_eq!(year.observations[0].gust, None);
        assert!(year.observations[0].indicators.snow_ice);
        assert!((year.completeness() - 2.0 / 366.0).abs() < 1e-12);
        assert!(dir.path().join("cache/gsod/2016/713930-99999.op").exists());

        // Only 2016 exists remotely; the other years of 2015..=2017 are skipped.
        let history = gsod.station_history(&station).await;
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), [2016]);
        assert_eq!(history[&2016], YEAR_TEXT);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_unchanged() {
        let base_url = serve("/2016/713930-99999-2016.op.gz", gzip(YEAR_TEXT).await).await;
        let (gsod, _dir) = client(&base_url).await;
        let station = gsod.registry().get(0).cloned().expect("station");
        let result = gsod
            .station_year(&station, 2015, &DecodeOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(GsodError::Fetch(crate::FetchError::HttpStatus { .. }))
        ));
    }
}
