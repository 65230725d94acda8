use super::badge::BadgeStrategy;
use super::gps::GpsStrategy;
use super::nfc::NfcStrategy;
use super::qr::QrStrategy;
use super::smart::SmartStrategy;
use super::web::WebStrategy;
use super::{
    DeviceCapabilities, DeviceHub, PayloadBase, StrategyContext, ValidationOutcome,
    VerificationStrategy, require_valid,
};
use crate::errors::{AttendanceError, AttendanceResult};
use crate::models::{TrackingMethod, VerificationPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verification strategies keyed by method, with at most one active.
pub struct StrategyRegistry {
    hub: Arc<dyn DeviceHub>,
    strategies: HashMap<TrackingMethod, Box<dyn VerificationStrategy>>,
    active: Option<TrackingMethod>,
}

impl StrategyRegistry {
    /// An empty registry; see [`StrategyRegistry::with_defaults`].
    pub fn new(hub: Arc<dyn DeviceHub>) -> Self {
        Self {
            hub,
            strategies: HashMap::new(),
            active: None,
        }
    }

    /// One strategy for every tracking method.
    pub fn with_defaults(hub: Arc<dyn DeviceHub>) -> Self {
        let mut registry = Self::new(Arc::clone(&hub));
        registry.register(Box::new(GpsStrategy::new(Arc::clone(&hub))));
        registry.register(Box::new(NfcStrategy::new(Arc::clone(&hub))));
        registry.register(Box::new(QrStrategy::new(Arc::clone(&hub))));
        registry.register(Box::new(BadgeStrategy::new(Arc::clone(&hub))));
        registry.register(Box::new(WebStrategy::new()));
        registry.register(Box::new(SmartStrategy::new(hub)));
        registry
    }

    /// Add or replace the strategy for its method. Replacing the active one
    /// deactivates it first.
    pub fn register(&mut self, strategy: Box<dyn VerificationStrategy>) {
        let method = strategy.method();
        if self.active == Some(method) {
            self.deactivate();
        }
        if let Some(mut previous) = self.strategies.insert(method, strategy) {
            previous.teardown();
        }
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.hub.capabilities()
    }

    /// Registered methods the given capabilities can serve, in display order.
    pub fn available_methods(&self, capabilities: &DeviceCapabilities) -> Vec<TrackingMethod> {
        TrackingMethod::ALL
            .into_iter()
            .filter(|m| {
                self.strategies
                    .get(m)
                    .is_some_and(|s| s.is_available(capabilities))
            })
            .collect()
    }

    pub fn active_method(&self) -> Option<TrackingMethod> {
        self.active
    }

    pub fn is_prepared(&self, method: TrackingMethod) -> bool {
        self.strategies.get(&method).is_some_and(|s| s.is_prepared())
    }

    /// Make `method` the active strategy.
    ///
    /// The previously active strategy is torn down before the new one is
    /// prepared. If preparation fails nothing stays active.
    pub fn select(&mut self, method: TrackingMethod, ctx: &StrategyContext) -> AttendanceResult<()> {
        if self.active == Some(method) && self.is_prepared(method) {
            return Ok(());
        }

        self.deactivate();

        let capabilities = self.hub.capabilities();
        let strategy = self.strategies.get_mut(&method).ok_or_else(|| {
            AttendanceError::Validation(format!("no strategy registered for '{method}'"))
        })?;

        if !strategy.is_available(&capabilities) {
            return Err(AttendanceError::Preparation(format!(
                "'{method}' is not available on this device"
            )));
        }

        if let Err(e) = strategy.prepare(ctx) {
            warn!(%method, error = %e, "strategy preparation failed");
            strategy.teardown();
            return Err(match e {
                AttendanceError::Preparation(_) => e,
                other => AttendanceError::Preparation(other.message().to_string()),
            });
        }

        info!(%method, "verification strategy selected");
        self.active = Some(method);
        Ok(())
    }

    /// Tear down the active strategy, if any.
    pub fn deactivate(&mut self) {
        if let Some(method) = self.active.take()
            && let Some(strategy) = self.strategies.get_mut(&method)
        {
            strategy.teardown();
            debug!(%method, "verification strategy torn down");
        }
    }

    fn active_strategy(&self) -> AttendanceResult<&dyn VerificationStrategy> {
        self.active
            .and_then(|m| self.strategies.get(&m))
            .map(|s| s.as_ref())
            .ok_or_else(|| AttendanceError::Validation("no verification method selected".into()))
    }

    pub fn validate(&self, ctx: &StrategyContext) -> AttendanceResult<ValidationOutcome> {
        Ok(self.active_strategy()?.validate(ctx))
    }

    pub fn augment_payload(
        &self,
        base: PayloadBase,
        ctx: &StrategyContext,
    ) -> AttendanceResult<VerificationPayload> {
        self.active_strategy()?.augment_payload(base, ctx)
    }

    /// Validate, then build the payload for a clock-in. Returns the warnings
    /// alongside the payload.
    pub fn verify(
        &self,
        ctx: &StrategyContext,
    ) -> AttendanceResult<(VerificationPayload, Vec<String>)> {
        let strategy = self.active_strategy()?;
        let outcome = strategy.validate(ctx);
        require_valid(strategy.method(), &outcome)?;
        for warning in &outcome.warnings {
            warn!(method = %strategy.method(), %warning, "verification warning");
        }
        let payload = strategy.augment_payload(PayloadBase::from_context(ctx), ctx)?;
        Ok((payload, outcome.warnings))
    }
}

impl Drop for StrategyRegistry {
    fn drop(&mut self) {
        self.deactivate();
    }
}
