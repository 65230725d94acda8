use super::session::GeoSnapshot;
use super::store::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePosition {
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl DevicePosition {
    pub fn new(coordinates: Coordinates, accuracy_m: Option<f64>, captured_at: DateTime<Utc>) -> Self {
        Self {
            coordinates,
            accuracy_m,
            captured_at,
            address: None,
        }
    }

    pub fn to_snapshot(&self) -> GeoSnapshot {
        GeoSnapshot {
            latitude: self.coordinates.latitude,
            longitude: self.coordinates.longitude,
            accuracy_m: self.accuracy_m,
            address: self.address.clone(),
        }
    }
}
