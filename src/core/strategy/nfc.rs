use super::{
    DeviceCapabilities, DeviceHub, DeviceResource, PayloadBase, ResourceLease, StrategyContext,
    ValidationOutcome, VerificationStrategy, require_valid,
};
use crate::errors::AttendanceResult;
use crate::models::{Evidence, TrackingMethod, VerificationPayload};
use std::sync::Arc;

pub struct NfcStrategy {
    hub: Arc<dyn DeviceHub>,
    reader: Option<ResourceLease>,
}

impl NfcStrategy {
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self { hub, reader: None }
    }
}

impl VerificationStrategy for NfcStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Nfc
    }

    fn is_available(&self, capabilities: &DeviceCapabilities) -> bool {
        capabilities.nfc
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.reader.is_none() {
            self.reader = Some(ResourceLease::acquire(&self.hub, DeviceResource::NfcReader)?);
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.reader.is_some()
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        if ctx.scanned_value().is_some() {
            ValidationOutcome::valid()
        } else {
            ValidationOutcome::invalid("no NFC tag scanned")
        }
    }

    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        require_valid(self.method(), &self.validate(ctx))?;
        let tag_id = ctx.scanned_value().unwrap_or_default().to_string();
        Ok(VerificationPayload {
            method: self.method(),
            evidence: Evidence::NfcTag { tag_id },
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        self.reader = None;
    }
}
