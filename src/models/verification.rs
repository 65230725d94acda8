use super::session::GeoSnapshot;
use super::tracking_method::TrackingMethod;
use crate::errors::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Method-specific proof attached to a clock-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Evidence {
    Geofence {
        store_id: String,
        distance_meters: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accuracy_m: Option<f64>,
    },
    NfcTag {
        tag_id: String,
    },
    QrToken {
        token: String,
    },
    Badge {
        badge_id: String,
    },
    Fingerprint {
        fingerprint: String,
    },
    /// Smart mode: the method that was actually detected, with its proof.
    AutoDetected {
        detected: TrackingMethod,
        evidence: Box<Evidence>,
    },
}

/// The strategy-specific proof handed to the clock-in transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    pub method: TrackingMethod,
    pub evidence: Evidence,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoSnapshot>,
}

impl VerificationPayload {
    /// A payload is accepted only for the selected method and only while it
    /// is no older than `window` and not dated in the future.
    pub fn check(
        &self,
        selected: TrackingMethod,
        now: DateTime<Utc>,
        window: Duration,
    ) -> AttendanceResult<()> {
        if self.method != selected {
            return Err(AttendanceError::Verification(format!(
                "payload was produced by '{}' but '{}' is selected",
                self.method, selected
            )));
        }
        if self.captured_at > now {
            return Err(AttendanceError::Verification(
                "payload is dated in the future".into(),
            ));
        }
        let age = now - self.captured_at;
        if age > window {
            return Err(AttendanceError::Verification(format!(
                "payload is stale ({}s old, window {}s)",
                age.num_seconds(),
                window.num_seconds()
            )));
        }
        Ok(())
    }
}

/// Client description sent with every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub client_version: String,
    pub host: String,
    pub fingerprint: String,
}

impl DeviceInfo {
    /// Describe the host this process runs on.
    pub fn detect() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown-host".to_string());
        let platform = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);

        Self {
            fingerprint: format!("{}:{}", platform, host.to_lowercase()),
            platform,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            host,
        }
    }
}
