use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the user proves presence when clocking in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMethod {
    Gps,
    Nfc,
    Qr,
    Badge,
    Web,
    Smart,
}

impl TrackingMethod {
    pub const ALL: [TrackingMethod; 6] = [
        TrackingMethod::Gps,
        TrackingMethod::Nfc,
        TrackingMethod::Qr,
        TrackingMethod::Badge,
        TrackingMethod::Web,
        TrackingMethod::Smart,
    ];

    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TrackingMethod::Gps => "gps",
            TrackingMethod::Nfc => "nfc",
            TrackingMethod::Qr => "qr",
            TrackingMethod::Badge => "badge",
            TrackingMethod::Web => "web",
            TrackingMethod::Smart => "smart",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "gps" => Some(TrackingMethod::Gps),
            "nfc" => Some(TrackingMethod::Nfc),
            "qr" => Some(TrackingMethod::Qr),
            "badge" => Some(TrackingMethod::Badge),
            "web" => Some(TrackingMethod::Web),
            "smart" => Some(TrackingMethod::Smart),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackingMethod::Gps => "GPS geofence",
            TrackingMethod::Nfc => "NFC tag",
            TrackingMethod::Qr => "QR code",
            TrackingMethod::Badge => "Badge",
            TrackingMethod::Web => "Web fingerprint",
            TrackingMethod::Smart => "Smart (auto-detect)",
        }
    }
}

impl fmt::Display for TrackingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}
