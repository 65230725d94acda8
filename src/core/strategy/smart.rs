use super::gps::geofence_evidence;
use super::web::fingerprint_outcome;
use super::{
    DeviceCapabilities, DeviceHub, DeviceResource, PayloadBase, ResourceLease, StrategyContext,
    ValidationOutcome, VerificationStrategy, require_valid,
};
use crate::errors::{AttendanceError, AttendanceResult};
use crate::models::{Evidence, TrackingMethod, VerificationPayload};
use std::sync::Arc;
use tracing::debug;

/// Auto-detection: geofence first, then an NFC tag, then the web fingerprint.
///
/// Preparation borrows whichever of the geofence watch and NFC reader the
/// device has; missing hardware just narrows detection.
pub struct SmartStrategy {
    hub: Arc<dyn DeviceHub>,
    leases: Vec<ResourceLease>,
    prepared: bool,
}

impl SmartStrategy {
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self {
            hub,
            leases: Vec::new(),
            prepared: false,
        }
    }

    fn holds(&self, resource: DeviceResource) -> bool {
        self.leases.iter().any(|l| l.resource() == resource)
    }

    /// The method that would be used right now, with its evidence and the
    /// warnings it carries.
    fn detect(
        &self,
        ctx: &StrategyContext,
    ) -> Result<(TrackingMethod, Evidence, ValidationOutcome), String> {
        if self.holds(DeviceResource::GeofenceWatch)
            && let Ok(evidence) = geofence_evidence(ctx)
        {
            return Ok((TrackingMethod::Gps, evidence, ValidationOutcome::valid()));
        }

        if self.holds(DeviceResource::NfcReader)
            && let Some(tag) = ctx.scanned_value()
        {
            let evidence = Evidence::NfcTag {
                tag_id: tag.to_string(),
            };
            return Ok((TrackingMethod::Nfc, evidence, ValidationOutcome::valid()));
        }

        let outcome = fingerprint_outcome(ctx);
        if !outcome.is_valid {
            return Err(outcome
                .error
                .unwrap_or_else(|| "no verification method detected".into()));
        }
        let evidence = Evidence::Fingerprint {
            fingerprint: ctx.device.fingerprint.clone(),
        };
        Ok((TrackingMethod::Web, evidence, outcome))
    }
}

impl VerificationStrategy for SmartStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Smart
    }

    fn is_available(&self, _capabilities: &DeviceCapabilities) -> bool {
        true
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.prepared {
            return Ok(());
        }
        let caps = self.hub.capabilities();
        self.leases = [DeviceResource::GeofenceWatch, DeviceResource::NfcReader]
            .into_iter()
            .filter(|r| caps.supports(*r))
            .map(|r| ResourceLease::acquire(&self.hub, r))
            .collect::<AttendanceResult<Vec<_>>>()?;
        self.prepared = true;
        debug!(leases = self.leases.len(), "smart detection prepared");
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        match self.detect(ctx) {
            Ok((detected, _, outcome)) => {
                debug!(%detected, "smart detection");
                outcome
            }
            Err(reason) => ValidationOutcome::invalid(reason),
        }
    }

    fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        require_valid(self.method(), &self.validate(ctx))?;
        let (detected, evidence, _) = self
            .detect(ctx)
            .map_err(AttendanceError::Verification)?;
        Ok(VerificationPayload {
            method: self.method(),
            evidence: Evidence::AutoDetected {
                detected,
                evidence: Box::new(evidence),
            },
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        self.leases.clear();
        self.prepared = false;
    }
}
