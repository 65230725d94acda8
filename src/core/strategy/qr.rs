use super::{
    DeviceCapabilities, DeviceHub, DeviceResource, PayloadBase, ResourceLease, StrategyContext,
    ValidationOutcome, VerificationStrategy, require_valid,
};
use crate::errors::AttendanceResult;
use crate::models::{Evidence, TrackingMethod, VerificationPayload};
use std::sync::Arc;

/// Store id embedded in a `store:<id>:<rest>` token, if the token has that form.
pub fn token_store_id(token: &str) -> Option<&str> {
    let rest = token.strip_prefix("store:")?;
    let (id, _) = rest.split_once(':')?;
    (!id.is_empty()).then_some(id)
}

pub struct QrStrategy {
    hub: Arc<dyn DeviceHub>,
    camera: Option<ResourceLease>,
}

impl QrStrategy {
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self { hub, camera: None }
    }
}

impl VerificationStrategy for QrStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Qr
    }

    fn is_available(&self, capabilities: &DeviceCapabilities) -> bool {
        capabilities.camera
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.camera.is_none() {
            self.camera = Some(ResourceLease::acquire(&self.hub, DeviceResource::Camera)?);
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.camera.is_some()
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        let Some(token) = ctx.scanned_value() else {
            return ValidationOutcome::invalid("no QR code scanned");
        };

        match (token_store_id(token), ctx.store.as_ref()) {
            (Some(id), Some(store)) if id != store.id() => ValidationOutcome::invalid(format!(
                "QR code belongs to store '{id}', not '{}'",
                store.id()
            )),
            _ => ValidationOutcome::valid(),
        }
    }

    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        require_valid(self.method(), &self.validate(ctx))?;
        let token = ctx.scanned_value().unwrap_or_default().to_string();
        Ok(VerificationPayload {
            method: self.method(),
            evidence: Evidence::QrToken { token },
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        self.camera = None;
    }
}
