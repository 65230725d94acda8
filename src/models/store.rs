use crate::errors::{AttendanceError, AttendanceResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting values outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> AttendanceResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AttendanceError::Validation(format!(
                "latitude {latitude} out of range [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AttendanceError::Validation(format!(
                "longitude {longitude} out of range [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A physical location eligible for clock-in, as returned by the store directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinates: Coordinates,
}

/// A store ranked against the current device position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCandidate {
    #[serde(flatten)]
    pub store: Store,
    /// `None` when no device position is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl StoreCandidate {
    pub fn unranked(store: Store) -> Self {
        Self {
            store,
            distance_meters: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.store.id
    }

    pub fn name(&self) -> &str {
        &self.store.name
    }

    pub fn in_geofence(&self, radius_m: f64) -> bool {
        self.distance_meters.is_some_and(|d| d <= radius_m)
    }
}
