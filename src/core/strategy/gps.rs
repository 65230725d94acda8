use super::{
    DeviceCapabilities, DeviceHub, DeviceResource, PayloadBase, ResourceLease, StrategyContext,
    ValidationOutcome, VerificationStrategy, require_valid,
};
use crate::core::geo::haversine_meters;
use crate::errors::{AttendanceError, AttendanceResult};
use crate::models::{Evidence, TrackingMethod, VerificationPayload};
use std::sync::Arc;
use tracing::debug;

/// Above this reported accuracy a geofence match is only trusted with a warning.
pub const POOR_ACCURACY_M: f64 = 100.0;

/// Geofence check shared with smart detection: `Ok` carries the evidence,
/// `Err` the reason the device is not inside the selected store's fence.
pub(crate) fn geofence_evidence(ctx: &StrategyContext) -> Result<Evidence, String> {
    let store = ctx
        .store
        .as_ref()
        .ok_or_else(|| "no store selected".to_string())?;
    let position = ctx
        .position
        .as_ref()
        .ok_or_else(|| "no device position".to_string())?;

    let distance = haversine_meters(&position.coordinates, &store.store.coordinates);
    if distance > ctx.geofence_radius_m {
        return Err(format!(
            "{:.0} m from '{}', outside the {:.0} m geofence",
            distance,
            store.name(),
            ctx.geofence_radius_m
        ));
    }

    Ok(Evidence::Geofence {
        store_id: store.id().to_string(),
        distance_meters: distance,
        accuracy_m: position.accuracy_m,
    })
}

pub struct GpsStrategy {
    hub: Arc<dyn DeviceHub>,
    watch: Option<ResourceLease>,
}

impl GpsStrategy {
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self { hub, watch: None }
    }
}

impl VerificationStrategy for GpsStrategy {
    fn method(&self) -> TrackingMethod {
        TrackingMethod::Gps
    }

    fn is_available(&self, capabilities: &DeviceCapabilities) -> bool {
        capabilities.geolocation
    }

    fn prepare(&mut self, _ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.watch.is_none() {
            self.watch = Some(ResourceLease::acquire(
                &self.hub,
                DeviceResource::GeofenceWatch,
            )?);
            debug!("geofence watch started");
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.watch.is_some()
    }

    fn validate(&self, ctx: &StrategyContext) -> ValidationOutcome {
        match geofence_evidence(ctx) {
            Ok(_) => {
                let outcome = ValidationOutcome::valid();
                match ctx.position.as_ref().and_then(|p| p.accuracy_m) {
                    Some(acc) if acc > POOR_ACCURACY_M => outcome.with_warning(format!(
                        "position accuracy is poor ({acc:.0} m)"
                    )),
                    _ => outcome,
                }
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
        let evidence = geofence_evidence(ctx).map_err(AttendanceError::Verification)?;
        Ok(VerificationPayload {
            method: self.method(),
            evidence,
            captured_at: base.captured_at,
            geo_location: base.geo_location,
        })
    }

    fn teardown(&mut self) {
        if self.watch.take().is_some() {
            debug!("geofence watch stopped");
        }
    }
}
