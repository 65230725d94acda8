use super::{
    DeviceCapabilities, PayloadBase, StrategyContext, ValidationOutcome, VerificationStrategy,
    require_valid,
};
use crate::errors::AttendanceResult;
use crate::models::{Evidence, TrackingMethod, VerificationPayload};

/// Browser-style clock-in: the device fingerprint is the only evidence.
#[derive(Debug, Default)]
pub struct WebStrategy {
    prepared: bool,
}

impl WebStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn fingerprint_outcome(ctx: &StrategyContext) -> ValidationOutcome {
    if ctx.device.fingerprint.trim().is_empty() {
        return ValidationOutcome::invalid("device fingerprint is empty");
    }
    let outcome = ValidationOutcome::valid();
    if ctx.position.is_none() {
        outcome.with_warning("no position attached, location will not be verified")
    } else {
        outcome
    }
}

impl VerificationStrategy for WebStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Web
    }

    fn is_available(&self, _capabilities: &DeviceCapabilities) -> bool {
        true
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        self.prepared = true;
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        fingerprint_outcome(ctx)
    }

    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        require_valid(self.method(), &self.validate(ctx))?;
        Ok(VerificationPayload {
            method: self.method(),
            evidence: Evidence::Fingerprint {
                fingerprint: ctx.device.fingerprint.clone(),
            },
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        self.prepared = false;
    }
}
