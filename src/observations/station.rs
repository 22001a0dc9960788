//! Observation stations as listed by the `liste-stations` endpoint, and the
//! spatial indexing needed to search them by distance.

use chrono::NaiveDate;
use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

/// A Météo-France observation station.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Station {
    /// Météo-France station identifier, e.g. `"75114001"`. Leading zeros are significant.
    pub id: String,
    /// World Meteorological Organization identifier, when the station has one.
    pub wmo_id: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level in meters.
    pub altitude: f64,
    /// Date the station started reporting.
    pub opened: Option<NaiveDate>,
    /// Observation pack the station belongs to (`RADOME`, `ETENDU`).
    pub pack: Option<String>,
}

/// Stations are points in an `rstar` tree, keyed on (latitude, longitude).
impl RTreeObject for Station {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.latitude, self.longitude])
    }
}

/// Squared Euclidean distance in degree space. Only used to order candidates;
/// real distances are computed with haversine afterwards.
impl PointDistance for Station {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.latitude - point[0];
        let dlon = self.longitude - point[1];
        dlat * dlat + dlon * dlon
    }
}
