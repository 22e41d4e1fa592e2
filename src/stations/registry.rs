//! The in-memory ISD station registry.
//!
//! The registry is read from the tab separated `isd-history` export (USAF, WBAN, NAME, CTRY,
//! ST, ICAO, LAT, LON, ELEV, BEGIN, END) and cached as bincode next to the other downloads,
//! so later start-ups skip the text parse.

use crate::stations::error::LocateStationError;
use crate::types::station::StationRecord;
use bincode::config::{Configuration, Fixint, LittleEndian};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;

const BINCODE_CACHE_PREFIX: &str = "isd_history";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// Raw numeric value meaning "not specified" in the registry export.
const UNSPECIFIED: f64 = 99_999.0;
const FIELD_COUNT: usize = 11;

/// Immutable, ordered collection of every station that has coordinates.
///
/// Positions are stable for the lifetime of the registry; the spatial index refers to
/// stations by position only.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<StationRecord>,
}

/// Identifies the TSV file a cache was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SourceStamp {
    path: PathBuf,
    len: u64,
    /// Modification time since the Unix epoch, if the platform reports one.
    modified: Option<Duration>,
}

impl SourceStamp {
    async fn of(tsv_path: &Path) -> Result<Self, LocateStationError> {
        let read_error = |e| LocateStationError::RegistryRead(tsv_path.to_path_buf(), e);
        let path = fs::canonicalize(tsv_path).await.map_err(read_error)?;
        let metadata = fs::metadata(&path).await.map_err(read_error)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok());
        Ok(Self {
            path,
            len: metadata.len(),
            modified,
        })
    }

    /// Without a modification time a cache cannot be told apart from a stale one.
    fn is_cacheable(&self) -> bool {
        self.modified.is_some()
    }

    fn cache_file_name(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.path.hash(&mut hasher);
        format!("{}-{:016x}.bin", BINCODE_CACHE_PREFIX, hasher.finish())
    }
}

/// On-disk form of the registry cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedRegistry {
    source: SourceStamp,
    stations: Vec<StationRecord>,
}

/// Why a registry row was dropped.
#[derive(Debug, PartialEq)]
enum RowRejection {
    MissingCoordinates,
    Invalid(String),
}

impl StationRegistry {
    /// Builds a registry from already parsed records, keeping their order.
    /// Records with non-finite coordinates are left out.
    pub fn from_stations(mut stations: Vec<StationRecord>) -> Self {
        stations.retain(|s| s.latitude.is_finite() && s.longitude.is_finite());
        Self { stations }
    }

    /// Parses the tab separated registry export.
    ///
    /// Rows without coordinates are excluded; rows that cannot be interpreted at all are
    /// skipped with a warning. Source order is preserved.
    pub fn from_tsv_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut stations = Vec::new();
        let mut missing_coordinates = 0usize;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(&line) {
                Ok(station) => stations.push(station),
                Err(RowRejection::MissingCoordinates) => missing_coordinates += 1,
                Err(RowRejection::Invalid(reason)) => {
                    warn!("Skipping registry line {}: {}", index + 1, reason)
                }
            }
        }
        debug!(
            "Parsed {} stations, excluded {} without coordinates",
            stations.len(),
            missing_coordinates
        );
        Ok(Self { stations })
    }

    pub fn from_tsv_str(text: &str) -> Self {
        // Reading from a byte slice cannot fail.
        Self::from_tsv_reader(text.as_bytes()).unwrap_or_default()
    }

    /// Loads the registry from `tsv_path`, going through the bincode cache in `cache_dir`.
    ///
    /// Each source file gets its own cache file, named after its canonical path. The cache
    /// also records the path, size and modification time of the TSV it was built from and is
    /// only reused while they still match; otherwise it is rebuilt.
    pub async fn load(tsv_path: &Path, cache_dir: &Path) -> Result<Self, LocateStationError> {
        let source = SourceStamp::of(tsv_path).await?;
        let cache_file = cache_dir.join(source.cache_file_name());

        if source.is_cacheable() && fs::try_exists(&cache_file).await.unwrap_or(false) {
            let path_clone = cache_file.clone();
            match tokio::task::spawn_blocking(move || Self::get_cached_stations(&path_clone))
                .await?
            {
                Ok(cached) if cached.source == source => {
                    info!(
                        "Loaded {} stations from cache {}",
                        cached.stations.len(),
                        cache_file.display()
                    );
                    return Ok(Self {
                        stations: cached.stations,
                    });
                }
                Ok(_) => info!("Station cache {} is stale", cache_file.display()),
                Err(e) => warn!("Discarding unreadable station cache: {}", e),
            }
        }

        info!("Parsing station registry {}", tsv_path.display());
        let parse_start = std::time::Instant::now();
        let tsv_owned = tsv_path.to_path_buf();
        let registry = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&tsv_owned)
                .map_err(|e| LocateStationError::RegistryRead(tsv_owned.clone(), e))?;
            Self::from_tsv_reader(std::io::BufReader::new(file))
                .map_err(|e| LocateStationError::RegistryRead(tsv_owned, e))
        })
        .await??;
        info!(
            "Parsed {} stations from TSV in {:?}",
            registry.len(),
            parse_start.elapsed()
        );

        fs::create_dir_all(cache_dir)
            .await
            .map_err(|e| LocateStationError::CacheDirCreation(cache_dir.to_path_buf(), e))?;
        let cached = CachedRegistry {
            source,
            stations: registry.stations.clone(),
        };
        Self::cache_stations(cached, &cache_file).await?;
        Ok(registry)
    }

    fn get_cached_stations(cache_path: &Path) -> Result<CachedRegistry, LocateStationError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| LocateStationError::CacheRead(cache_path.to_path_buf(), e))?;
        let (decoded, _) =
            bincode::serde::decode_from_slice::<CachedRegistry, _>(&bytes, BINCODE_CONFIG)
                .map_err(|e| {
                    LocateStationError::CacheDecode(cache_path.to_path_buf(), Box::from(e))
                })?;
        Ok(decoded)
    }

    async fn cache_stations(
        cached: CachedRegistry,
        cache_path: &Path,
    ) -> Result<(), LocateStationError> {
        let bincode_data = tokio::task::spawn_blocking(move || {
            bincode::serde::encode_to_vec(&cached, BINCODE_CONFIG)
                .map_err(|e| LocateStationError::CacheEncode(Box::new(e)))
        })
        .await??;
        fs::write(cache_path, &bincode_data)
            .await
            .map_err(|e| LocateStationError::CacheWrite(cache_path.to_path_buf(), e))?;
        debug!(
            "Wrote station cache ({} bytes) to {}",
            bincode_data.len(),
            cache_path.display()
        );
        Ok(())
    }

    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    pub fn get(&self, position: usize) -> Option<&StationRecord> {
        self.stations.get(position)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.iter()
    }
}

fn parse_row(line: &str) -> Result<StationRecord, RowRejection> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < FIELD_COUNT {
        return Err(RowRejection::Invalid(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let latitude = numeric_field(fields[6], "LAT")?;
    let longitude = numeric_field(fields[7], "LON")?;
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Err(RowRejection::MissingCoordinates);
    };

    let record_begin = integer_field(fields[9], "BEGIN")?
        .ok_or_else(|| RowRejection::Invalid("missing BEGIN".to_string()))?;
    let record_end = integer_field(fields[10], "END")?
        .ok_or_else(|| RowRejection::Invalid("missing END".to_string()))?;

    Ok(StationRecord {
        usaf: integer_field(fields[0], "USAF")?,
        wban: integer_field(fields[1], "WBAN")?,
        name: fields[2].to_string(),
        country: text_field(fields[3]),
        state: text_field(fields[4]),
        icao: text_field(fields[5]),
        latitude,
        longitude,
        elevation_m: numeric_field(fields[8], "ELEV")?,
        record_begin,
        record_end,
    })
}

fn text_field(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Empty and `99999` values are absent; anything else must be a finite number.
fn numeric_field(raw: &str, name: &str) -> Result<Option<f64>, RowRejection> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| RowRejection::Invalid(format!("{} is not numeric: '{}'", name, raw)))?;
    if !value.is_finite() {
        return Err(RowRejection::Invalid(format!("{} is not finite: '{}'", name, raw)));
    }
    Ok((value != UNSPECIFIED).then_some(value))
}

fn integer_field(raw: &str, name: &str) -> Result<Option<u32>, RowRejection> {
    match numeric_field(raw, name)? {
        None => Ok(None),
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(Some(v as u32)),
        Some(_) => Err(RowRejection::Invalid(format!(
            "{} is not a non-negative integer: '{}'",
            name, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
713930\t99999\tCALGARY INTL CS\tCA\t\t\t51.1\t-114.0\t1084.1\t20040101\t20170101
010010\t99999\tJAN MAYEN(NOR-NAVY)\tNO\t\tENJA\t70.933\t-8.667\t9.0\t19310101\t20170510
010014\t99999\tSORSTOKKEN\tNO\t\tENSO\t\t\t48.8\t19860120\t20170510
722950\t23174\tLOS ANGELES INTERNATIONAL AIRPORT\tUS\tCA\tKLAX\t33.938\t-118.389\t29.6\t19440101\t20170510
";

    #[test]
    fn test_parse_sample_preserves_order_and_skips_missing_coordinates() {
        let registry = StationRegistry::from_tsv_str(SAMPLE);
        assert_eq!(registry.len(), 3);
        let names: Vec<&str> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["CALGARY INTL CS", "JAN MAYEN(NOR-NAVY)", "LOS ANGELES INTERNATIONAL AIRPORT"]
        );
    }

    #[test]
    fn test_sentinel_and_empty_fields_are_absent() {
        let registry = StationRegistry::from_tsv_str(SAMPLE);
        let calgary = registry.get(0).unwrap();
        assert_eq!(calgary.usaf, Some(713_930));
        assert_eq!(calgary.wban, None);
        assert_eq!(calgary.state, None);
        assert_eq!(calgary.icao, None);
        assert_eq!(calgary.country.as_deref(), Some("CA"));
        assert_eq!(calgary.elevation_m, Some(1084.1));
        assert_eq!(calgary.record_begin, 20_040_101);
        assert_eq!(calgary.record_end, 20_170_101);

        let lax = registry.get(2).unwrap();
        assert_eq!(lax.wban, Some(23_174));
        assert_eq!(lax.state.as_deref(), Some("CA"));
        assert_eq!(lax.icao.as_deref(), Some("KLAX"));
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let text = "\
A00001\t99999\tLETTER ID\tUS\t\t\t10.0\t10.0\t1.0\t20000101\t20100101
713930\t99999\tSHORT ROW\tCA
713930\t99999\tNO END\tCA\t\t\t51.1\t-114.0\t1084.1\t20040101\t
700001\t99999\tGOOD\tUS\t\t\t1.0\t2.0\t+0006.0\t20000101\t20100101
";
        let registry = StationRegistry::from_tsv_str(text);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().name, "GOOD");
        assert_eq!(registry.get(0).unwrap().elevation_m, Some(6.0));
    }

    #[test]
    fn test_from_stations_drops_non_finite_coordinates() {
        let mut bad = crate::types::station::tests::station("BAD", f64::NAN, 0.0, 20_170_101);
        bad.longitude = 1.0;
        let good = crate::types::station::tests::station("GOOD", 1.0, 1.0, 20_170_101);
        let registry = StationRegistry::from_stations(vec![bad, good]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().name, "GOOD");
    }

    #[tokio::test]
    async fn test_load_writes_and_reuses_cache() -> Result<(), LocateStationError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let tsv_path = dir.path().join("isd-history.tsv");
        std::fs::write(&tsv_path, SAMPLE).expect("write tsv");
        let cache_dir = dir.path().join("cache");

        let first = StationRegistry::load(&tsv_path, &cache_dir).await?;
        assert_eq!(first.len(), 3);
        let cache_file = cache_dir.join(SourceStamp::of(&tsv_path).await?.cache_file_name());
        assert!(cache_file.exists());

        let second = StationRegistry::load(&tsv_path, &cache_dir).await?;
        assert_eq!(first.stations(), second.stations());
        Ok(())
    }

    fn single_station_tsv(name: &str) -> String {
        format!("700001\t99999\t{}\tUS\t\t\t1.0\t2.0\t10.0\t20000101\t20170101\n", name)
    }

    fn set_modified(path: &Path, time: std::time::SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(time))
            .expect("set mtime");
    }

    #[tokio::test]
    async fn test_registries_sharing_a_cache_dir_stay_apart() -> Result<(), LocateStationError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_dir = dir.path().join("cache");
        let older = dir.path().join("b.tsv");
        let newer = dir.path().join("a.tsv");
        std::fs::write(&older, single_station_tsv("FROM B")).expect("write b");
        std::fs::write(&newer, single_station_tsv("FROM A")).expect("write a");
        let now = std::time::SystemTime::now();
        set_modified(&older, now - Duration::from_secs(3600));
        set_modified(&newer, now);

        let a = StationRegistry::load(&newer, &cache_dir).await?;
        let b = StationRegistry::load(&older, &cache_dir).await?;
        assert_eq!(a.get(0).map(|s| s.name.as_str()), Some("FROM A"));
        assert_eq!(b.get(0).map(|s| s.name.as_str()), Some("FROM B"));

        // Both caches are reused afterwards.
        let a = StationRegistry::load(&newer, &cache_dir).await?;
        let b = StationRegistry::load(&older, &cache_dir).await?;
        assert_eq!(a.get(0).map(|s| s.name.as_str()), Some("FROM A"));
        assert_eq!(b.get(0).map(|s| s.name.as_str()), Some("FROM B"));
        Ok(())
    }

    #[tokio::test]
    async fn test_modified_tsv_rebuilds_cache() -> Result<(), LocateStationError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_dir = dir.path().join("cache");
        let tsv_path = dir.path().join("isd-history.tsv");
        std::fs::write(&tsv_path, single_station_tsv("BEFORE")).expect("write tsv");

        let before = StationRegistry::load(&tsv_path, &cache_dir).await?;
        assert_eq!(before.get(0).map(|s| s.name.as_str()), Some("BEFORE"));

        // Same length, later modification time.
        std::fs::write(&tsv_path, single_station_tsv("AFTER!")).expect("rewrite tsv");
        set_modified(&tsv_path, std::time::SystemTime::now() + Duration::from_secs(60));
        let after = StationRegistry::load(&tsv_path, &cache_dir).await?;
        assert_eq!(after.get(0).map(|s| s.name.as_str()), Some("AFTER!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_cache_is_rebuilt() -> Result<(), LocateStationError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_dir = dir.path().join("cache");
        let tsv_path = dir.path().join("isd-history.tsv");
        std::fs::write(&tsv_path, SAMPLE).expect("write tsv");
        std::fs::create_dir_all(&cache_dir).expect("mkdir");
        let cache_file = cache_dir.join(SourceStamp::of(&tsv_path).await?.cache_file_name());
        std::fs::write(&cache_file, b"garbage").expect("corrupt cache");

        let registry = StationRegistry::load(&tsv_path, &cache_dir).await?;
        assert_eq!(registry.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_tsv_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = StationRegistry::load(&dir.path().join("absent.tsv"), dir.path()).await;
        assert!(matches!(result, Err(LocateStationError::RegistryRead(_, _))));
    }
}
