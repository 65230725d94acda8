//! Identity-verification strategies.
//!
//! Each tracking method has one [`VerificationStrategy`]; the
//! [`StrategyRegistry`] keeps them keyed by method and drives
//! select → prepare → validate → augment without the state machine knowing
//! any method-specific detail.

pub mod badge;
pub mod device;
pub mod gps;
pub mod nfc;
pub mod qr;
pub mod registry;
pub mod smart;
pub mod web;

pub use device::{DeviceCapabilities, DeviceHub, DeviceResource, HostDevice, ResourceLease};
pub use registry::StrategyRegistry;

use crate::errors::AttendanceResult;
use crate::models::{DeviceInfo, DevicePosition, GeoSnapshot, StoreCandidate, TrackingMethod};
use crate::models::VerificationPayload;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything a strategy may look at.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub user_id: String,
    /// The store currently selected (auto or manual).
    pub store: Option<StoreCandidate>,
    pub position: Option<DevicePosition>,
    /// Raw value read by a scanner (NFC tag, QR token, badge id).
    pub scanned: Option<String>,
    pub device: DeviceInfo,
    pub geofence_radius_m: f64,
    pub now: DateTime<Utc>,
}

impl StrategyContext {
    /// The scanned value, trimmed, if it is not blank.
    pub fn scanned_value(&self) -> Option<&str> {
        self.scanned
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// The part of a payload every strategy shares.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadBase {
    pub captured_at: DateTime<Utc>,
    pub geo_location: Option<GeoSnapshot>,
}

impl PayloadBase {
    pub fn from_context(ctx: &StrategyContext) -> Self {
        Self {
            captured_at: ctx.now,
            geo_location: ctx.position.as_ref().map(DevicePosition::to_snapshot),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Warnings never block a clock-in.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub trait VerificationStrategy: Send {
    fn method(&self) -> TrackingMethod;

    /// Capability probe. Pure.
    fn is_available(&self, capabilities: &DeviceCapabilities) -> bool;

    /// Set up whatever the strategy needs. Idempotent while prepared.
    fn prepare(&mut self, ctx: &StrategyContext) -> AttendanceResult<()>;

    fn is_prepared(&self) -> bool;

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome;

    /// Merge the strategy's evidence into `base`. Fails with a verification
    /// error when `validate` would not pass.
    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload>;

    /// Release everything `prepare` acquired.
    fn teardown(&mut self);
}

/// Turn a failed outcome into the verification error shared by all strategies.
pub(crate) fn require_valid(
    method: TrackingMethod,
    outcome: &ValidationOutcome,
) -> AttendanceResult<()> {
    if outcome.is_valid {
        return Ok(());
    }
    Err(crate::errors::AttendanceError::Verification(format!(
        "{} verification failed: {}",
        method,
        outcome.error.as_deref().unwrap_or("evidence not satisfiable")
    )))
}
