use crate::observations::error::ObservationError;
use crate::observations::station::Station;
use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::NaiveDate;
use haversine::{distance, Location as HaversineLocation, Units};
use log::{debug, info};
use ordered_float::OrderedFloat;
use rstar::RTree;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

pub const STATION_CACHE_FILE_NAME: &str = "stations.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// Restricts a nearest-station search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationFilter {
    /// Keep stations that were already open on this date. Stations without an
    /// opening date are dropped.
    pub opened_by: Option<NaiveDate>,
    /// Keep stations of this observation pack (case-insensitive).
    pub pack: Option<String>,
}

impl StationFilter {
    fn is_empty(&self) -> bool {
        self.opened_by.is_none() && self.pack.is_none()
    }

    fn accepts(&self, station: &Station) -> bool {
        if let Some(date) = self.opened_by {
            match station.opened {
                Some(opened) if opened <= date => {}
                _ => return false,
            }
        }
        if let Some(pack) = &self.pack {
            match &station.pack {
                Some(p) if p.eq_ignore_ascii_case(pack) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Spatial index over the observation stations.
#[derive(Debug, Clone)]
pub struct StationLocator {
    rtree: RTree<Station>,
}

struct StationCandidate<'a> {
    distance_km: OrderedFloat<f64>,
    station: &'a Station,
}
impl PartialEq for StationCandidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.distance_km == other.distance_km
    }
}
impl Eq for StationCandidate<'_> {}
impl PartialOrd for StationCandidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for StationCandidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_km.cmp(&other.distance_km)
    }
}

fn haversine_km(latitude: f64, longitude: f64, station: &Station) -> f64 {
    distance(
        HaversineLocation {
            latitude,
            longitude,
        },
        HaversineLocation {
            latitude: station.latitude,
            longitude: station.longitude,
        },
        Units::Kilometers,
    )
}

impl StationLocator {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            rtree: RTree::bulk_load(stations),
        }
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    /// Reads a station list written by [`Self::cache_stations`].
    pub fn load_cached_stations(cache_path: &Path) -> Result<Vec<Station>, ObservationError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| ObservationError::CacheRead(cache_path.to_path_buf(), e))?;
        let (stations, _) =
            bincode::serde::decode_from_slice::<Vec<Station>, _>(&bytes, BINCODE_CONFIG).map_err(
                |e| ObservationError::CacheDecode(cache_path.to_path_buf(), Box::new(e)),
            )?;
        debug!(
            "decoded {} stations from {}",
            stations.len(),
            cache_path.display()
        );
        Ok(stations)
    }

    pub fn cache_stations(stations: &[Station], cache_path: &Path) -> Result<(), ObservationError> {
        let bytes = bincode::serde::encode_to_vec(stations, BINCODE_CONFIG)
            .map_err(|e| ObservationError::CacheEncode(Box::new(e)))?;
        std::fs::write(cache_path, &bytes)
            .map_err(|e| ObservationError::CacheWrite(cache_path.to_path_buf(), e))?;
        info!(
            "wrote station cache ({} bytes) to {}",
            bytes.len(),
            cache_path.display()
        );
        Ok(())
    }

    /// Up to `n_results` stations within `max_distance_km`, nearest first, with
    /// their great-circle distance in kilometers.
    pub fn query(
        &self,
        latitude: f64,
        longitude: f64,
        n_results: usize,
        max_distance_km: f64,
        filter: Option<&StationFilter>,
    ) -> Vec<(Station, f64)> {
        if n_results == 0 {
            return vec![];
        }
        match filter {
            Some(filter) if !filter.is_empty() => {
                self.filtered_heap_query(latitude, longitude, n_results, max_distance_km, filter)
            }
            _ => self.fast_proximity_query(latitude, longitude, n_results, max_distance_km),
        }
    }

    /// The R-tree orders by degree distance, which is close to but not the same
    /// as haversine order, so a few extra candidates are re-ranked.
    fn fast_proximity_query(
        &self,
        latitude: f64,
        longitude: f64,
        n_results: usize,
        max_distance_km: f64,
    ) -> Vec<(Station, f64)> {
        let candidate_limit = (n_results * 2).max(20);

        let mut stations_with_dist: Vec<(Station, f64)> = self
            .rtree
            .nearest_neighbor_iter(&[latitude, longitude])
            .take(candidate_limit)
            .filter_map(|station| {
                let dist_km = haversine_km(latitude, longitude, station);
                (dist_km <= max_distance_km).then(|| (station.clone(), dist_km))
            })
            .collect();

        stations_with_dist.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        stations_with_dist.truncate(n_results);
        stations_with_dist
    }

    fn filtered_heap_query(
        &self,
        latitude: f64,
        longitude: f64,
        n_results: usize,
        max_distance_km: f64,
        filter: &StationFilter,
    ) -> Vec<(Station, f64)> {
        let mut heap: BinaryHeap<StationCandidate<'_>> = BinaryHeap::with_capacity(n_results);
        let iteration_limit = (n_results * 2).max(20);
        let mut items_checked = 0;

        for station in self.rtree.nearest_neighbor_iter(&[latitude, longitude]) {
            if !filter.accepts(station) {
                continue;
            }
            items_checked += 1;

            let dist_km = haversine_km(latitude, longitude, station);
            if dist_km > max_distance_km * 2.0 {
                break;
            }
            if dist_km > max_distance_km {
                continue;
            }

            let candidate = StationCandidate {
                distance_km: OrderedFloat(dist_km),
                station,
            };
            if heap.len() < n_results {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate.distance_km < worst.distance_km {
                    heap.pop();
                    heap.push(candidate);
                }
            }

            if items_checked >= iteration_limit && heap.len() == n_results {
                break;
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| (c.station.clone(), c.distance_km.into_inner()))
            .collect()
    }
}
