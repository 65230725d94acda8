use super::{
    DeviceCapabilities, DeviceHub, DeviceResource, PayloadBase, ResourceLease, StrategyContext,
    ValidationOutcome, VerificationStrategy, require_valid,
};
use crate::errors::AttendanceResult;
use crate::models::{Evidence, TrackingMethod, VerificationPayload};
use std::sync::Arc;

/// Alphanumeric, dashes allowed after the first character.
pub fn is_valid_badge_id(id: &str) -> bool {
    id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub struct BadgeStrategy {
    hub: Arc<dyn DeviceHub>,
    reader: Option<ResourceLease>,
}

impl BadgeStrategy {
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self { hub, reader: None }
    }
}

impl VerificationStrategy for BadgeStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Badge
    }

    fn is_available(&self, capabilities: &DeviceCapabilities) -> bool {
        capabilities.badge_reader
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.reader.is_none() {
            self.reader = Some(ResourceLease::acquire(
                &self.hub,
                DeviceResource::BadgeReader,
            )?);
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.reader.is_some()
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        match ctx.scanned_value() {
            None => ValidationOutcome::invalid("no badge scanned"),
            Some(id) if !is_valid_badge_id(id) => {
                ValidationOutcome::invalid(format!("'{id}' is not a valid badge id"))
            }
            Some(_) => ValidationOutcome::valid(),
        }
    }

    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        require_valid(self.method(), &self.validate(ctx))?;
        let badge_id = ctx.scanned_value().unwrap_or_default().to_string();
        Ok(VerificationPayload {
            method: self.method(),
            evidence: Evidence::Badge { badge_id },
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        self.reader = None;
    }
}
