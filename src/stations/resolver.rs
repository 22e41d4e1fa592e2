//! Nearest-station resolution with a data recency filter.

use crate::stations::error::LocateStationError;
use crate::stations::registry::StationRegistry;
use crate::stations::spatial_index::SpatialIndex;
use crate::types::station::StationRecord;
use std::sync::Arc;

/// Stations must have records after this date (`YYYYMMDD`) unless told otherwise.
pub const DEFAULT_MIN_RECENT_DATA: u32 = 20_140_000;
/// Number of nearest candidates inspected by the first search pass.
pub const DEFAULT_MATCH_MAX: usize = 100;
/// Growth of the candidate window between search passes.
pub const DEFAULT_WIDENING_FACTOR: usize = 10;

/// Resolves coordinates to the closest station that is still reporting.
///
/// Owns the registry together with the index built over it, so index positions can never
/// drift from the records they point at.
#[derive(Debug, Clone)]
pub struct StationResolver {
    registry: Arc<StationRegistry>,
    index: SpatialIndex,
}

impl StationResolver {
    pub fn new(registry: Arc<StationRegistry>) -> Self {
        let index = SpatialIndex::build(registry.stations());
        Self { registry, index }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Finds the station nearest to `(latitude, longitude)` whose `record_end` is strictly
    /// after `min_recent_data`. Passing `0` accepts every station.
    ///
    /// Starts by inspecting the `match_max` nearest stations. When none qualifies the window
    /// is multiplied by `widening_factor` (at least 2) and the index is queried again, until
    /// the window covers the whole registry.
    ///
    /// # Errors
    ///
    /// Returns [`LocateStationError::NoStationFound`] if no station in the registry
    /// satisfies the recency filter.
    pub fn resolve(
        &self,
        latitude: f64,
        longitude: f64,
        min_recent_data: u32,
        match_max: usize,
        widening_factor: usize,
    ) -> Result<&StationRecord, LocateStationError> {
        let population = self.index.len();
        let widening_factor = widening_factor.max(2);
        let mut window = match_max.clamp(1, population.max(1));

        while population > 0 {
            let hit = self
                .index
                .nearest(latitude, longitude, window)
                .into_iter()
                .filter_map(|n| self.registry.get(n.position))
                .find(|station| station.record_end > min_recent_data);
            if let Some(station) = hit {
                return Ok(station);
            }
            if window >= population {
                break;
            }
            window = window.saturating_mul(widening_factor).min(population);
        }

        Err(LocateStationError::NoStationFound {
            latitude,
            longitude,
            min_recent_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::station::tests::station;
    use crate::types::station::LatLon;

    fn resolver(stations: Vec<StationRecord>) -> StationResolver {
        StationResolver::new(Arc::new(StationRegistry::from_stations(stations)))
    }

    fn nearest(
        r: &StationResolver,
        latitude: f64,
        longitude: f64,
        min_recent_data: u32,
    ) -> Result<&StationRecord, LocateStationError> {
        r.resolve(
            latitude,
            longitude,
            min_recent_data,
            DEFAULT_MATCH_MAX,
            DEFAULT_WIDENING_FACTOR,
        )
    }

    /// A dense ring of stale stations around the origin and a single active one far out.
    fn stale_neighbourhood(stale: usize) -> Vec<StationRecord> {
        let mut stations: Vec<StationRecord> = (0..stale)
            .map(|i| {
                let angle = i as f64 * 0.1;
                let radius = 0.01 + i as f64 * 0.001;
                station(
                    &format!("STALE {}", i),
                    radius * angle.sin(),
                    radius * angle.cos(),
                    19_990_101,
                )
            })
            .collect();
        stations.push(station("ACTIVE", 40.0, 40.0, 20_200_101));
        stations
    }

    #[test]
    fn test_calgary_scenario() -> Result<(), LocateStationError> {
        let r = resolver(vec![
            station("EDMONTON", 53.5, -113.5, 20_170_101),
            station("CALGARY STALE", 51.03, -114.05, 19_950_101),
            station("CALGARY INTL CS", 51.1, -114.0, 20_170_101),
            station("BANFF", 51.18, -115.57, 20_170_101),
        ]);
        let found = nearest(&r, 51.0253, -114.0499, 20_150_000)?;
        assert_eq!(found.name, "CALGARY INTL CS");

        // Without the recency filter the stale but closer station wins.
        let found = nearest(&r, 51.0253, -114.0499, 0)?;
        assert_eq!(found.name, "CALGARY STALE");
        Ok(())
    }

    #[test]
    fn test_no_filter_returns_global_nearest() -> Result<(), LocateStationError> {
        let stations = stale_neighbourhood(300);
        let r = resolver(stations.clone());
        for &(lat, lon) in &[(0.0, 0.0), (0.2, -0.1), (39.0, 41.0), (-60.0, 170.0)] {
            let query = LatLon(lat, lon);
            let expected = stations
                .iter()
                .min_by(|a, b| {
                    let da = (a.latitude - query.0).powi(2) + (a.longitude - query.1).powi(2);
                    let db = (b.latitude - query.0).powi(2) + (b.longitude - query.1).powi(2);
                    da.total_cmp(&db)
                })
                .unwrap();
            let found = r.resolve(lat, lon, 0, 1, DEFAULT_WIDENING_FACTOR)?;
            assert_eq!(found, expected);
        }
        Ok(())
    }

    #[test]
    fn test_widening_reaches_distant_active_station() -> Result<(), LocateStationError> {
        // 999 stale stations sit closer than the only active one, so the window has to grow
        // 100 -> 1000 before the active station is seen.
        let r = resolver(stale_neighbourhood(999));
        let found = nearest(&r, 0.0, 0.0, 20_140_000)?;
        assert_eq!(found.name, "ACTIVE");

        let found = r.resolve(0.0, 0.0, 20_140_000, 1, 2)?;
        assert_eq!(found.name, "ACTIVE");
        Ok(())
    }

    #[test]
    fn test_recency_filter_is_strict() -> Result<(), LocateStationError> {
        let r = resolver(vec![
            station("ENDS ON THRESHOLD", 0.0, 0.0, 20_150_000),
            station("ENDS AFTER", 1.0, 1.0, 20_150_001),
        ]);
        let found = nearest(&r, 0.0, 0.0, 20_150_000)?;
        assert_eq!(found.name, "ENDS AFTER");
        Ok(())
    }

    #[test]
    fn test_returns_closest_qualifying_station() -> Result<(), LocateStationError> {
        let r = resolver(vec![
            station("FAR ACTIVE", 5.0, 5.0, 20_200_101),
            station("NEAR STALE", 0.1, 0.1, 20_000_101),
            station("MID ACTIVE", 1.0, 1.0, 20_200_101),
        ]);
        let found = r.resolve(0.0, 0.0, 20_140_000, 1, DEFAULT_WIDENING_FACTOR)?;
        assert_eq!(found.name, "MID ACTIVE");
        Ok(())
    }

    #[test]
    fn test_not_found_after_full_population() {
        let r = resolver(stale_neighbourhood(50));
        let result = nearest(&r, 0.0, 0.0, 20_300_000);
        assert!(matches!(
            result,
            Err(LocateStationError::NoStationFound {
                min_recent_data: 20_300_000,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_registry_is_not_found() {
        let r = resolver(vec![]);
        assert!(matches!(
            nearest(&r, 0.0, 0.0, 0),
            Err(LocateStationError::NoStationFound { .. })
        ));
    }

    #[test]
    fn test_resolver_is_shareable_across_threads() {
        let r = resolver(stale_neighbourhood(200));
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let r = &r;
                    scope.spawn(move || {
                        nearest(r, i as f64 * 0.01, 0.0, 20_140_000)
                            .map(|s| s.name.clone())
                            .ok()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().as_deref(), Some("ACTIVE"));
            }
        });
    }
}
