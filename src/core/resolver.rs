//! Store resolution: rank the tenant's stores against the device position,
//! auto-select the nearest one inside the geofence, and let the user
//! override the choice with a reason.

use crate::backend::StoreDirectory;
use crate::core::geo::haversine_meters;
use crate::errors::{AttendanceError, AttendanceResult};
use crate::models::{DevicePosition, Store, StoreCandidate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::future::Future;
use tracing::{debug, info};

/// Default geofence radius, meters.
pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 200.0;

/// Where the device currently is.
pub trait PositionSource: Send + Sync {
    /// Fails with `AttendanceError::PositionUnavailable` when permission is
    /// denied or no fix arrives in time.
    fn current_position(&self) -> impl Future<Output = AttendanceResult<DevicePosition>> + Send;
}

/// A position source that answers with a known fix (or none).
#[derive(Debug, Clone, Default)]
pub struct FixedPosition(pub Option<DevicePosition>);

impl PositionSource for FixedPosition {
    async fn current_position(&self) -> AttendanceResult<DevicePosition> {
        self.0.clone().ok_or_else(|| {
            AttendanceError::PositionUnavailable("no position fix provided".into())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualOverride {
    pub store: StoreCandidate,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Sorted by ascending distance; stores without a distance come last.
    pub candidates: Vec<StoreCandidate>,
    pub auto_selected: Option<StoreCandidate>,
    /// Set when no device position was available for this cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_unavailable: Option<String>,
}

impl Resolution {
    fn rank(
        stores: Vec<Store>,
        position: Option<&DevicePosition>,
        radius_m: f64,
    ) -> Self {
        let mut candidates: Vec<StoreCandidate> = stores
            .into_iter()
            .map(|store| {
                let distance_meters =
                    position.map(|p| haversine_meters(&p.coordinates, &store.coordinates));
                StoreCandidate {
                    store,
                    distance_meters,
                }
            })
            .collect();

        candidates.sort_by(compare_candidates);

        let auto_selected = candidates
            .first()
            .filter(|c| c.in_geofence(radius_m))
            .cloned();

        Self {
            candidates,
            auto_selected,
            position_unavailable: None,
        }
    }

    pub fn find(&self, store_id: &str) -> Option<&StoreCandidate> {
        self.candidates.iter().find(|c| c.id() == store_id)
    }
}

fn compare_candidates(a: &StoreCandidate, b: &StoreCandidate) -> Ordering {
    match (a.distance_meters, b.distance_meters) {
        (Some(da), Some(db)) => da.total_cmp(&db).then_with(|| a.name().cmp(b.name())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name().cmp(b.name()),
    }
}

pub struct StoreResolver<D> {
    directory: D,
    tenant_id: String,
    radius_m: f64,
    position: Option<DevicePosition>,
    last: Option<Resolution>,
    manual: Option<ManualOverride>,
}

impl<D: StoreDirectory> StoreResolver<D> {
    pub fn new(directory: D, tenant_id: impl Into<String>, radius_m: f64) -> Self {
        Self {
            directory,
            tenant_id: tenant_id.into(),
            radius_m,
            position: None,
            last: None,
            manual: None,
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn position(&self) -> Option<&DevicePosition> {
        self.position.as_ref()
    }

    /// Fetch the directory and rank it against `position`.
    ///
    /// "No store in range" is a normal outcome (empty auto-selection). A new
    /// resolution cycle drops any previous manual override.
    pub async fn resolve(
        &mut self,
        position: Option<DevicePosition>,
    ) -> AttendanceResult<Resolution> {
        let stores = self.directory.list_stores(&self.tenant_id).await?;
        let mut resolution = Resolution::rank(stores, position.as_ref(), self.radius_m);
        if position.is_none() {
            resolution.position_unavailable = Some("no device position".into());
        }

        debug!(
            tenant = %self.tenant_id,
            candidates = resolution.candidates.len(),
            auto = ?resolution.auto_selected.as_ref().map(StoreCandidate::id),
            "stores resolved"
        );

        self.position = position;
        self.manual = None;
        self.last = Some(resolution.clone());
        Ok(resolution)
    }

    /// Acquire the position from `source`, then resolve. An unavailable
    /// position degrades to an unranked candidate list, it is not an error.
    pub async fn resolve_from<P: PositionSource>(
        &mut self,
        source: &P,
    ) -> AttendanceResult<Resolution> {
        match source.current_position().await {
            Ok(position) => self.resolve(Some(position)).await,
            Err(AttendanceError::PositionUnavailable(reason)) => {
                info!(%reason, "position unavailable, manual store selection required");
                let mut resolution = self.resolve(None).await?;
                resolution.position_unavailable = Some(reason);
                self.last = Some(resolution.clone());
                Ok(resolution)
            }
            Err(other) => Err(other),
        }
    }

    /// Re-rank the cached candidates for a new position without refetching.
    pub fn update_position(&mut self, position: DevicePosition) -> Option<Resolution> {
        let previous = self.last.take()?;
        let stores = previous.candidates.into_iter().map(|c| c.store).collect();
        let resolution = Resolution::rank(stores, Some(&position), self.radius_m);

        if let Some(manual) = &mut self.manual
            && let Some(updated) = resolution.find(manual.store.id())
        {
            manual.store = updated.clone();
        }

        self.position = Some(position);
        self.last = Some(resolution.clone());
        Some(resolution)
    }

    /// Record a manual selection that supersedes auto-selection.
    pub fn override_store(
        &mut self,
        store_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AttendanceResult<StoreCandidate> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AttendanceError::Validation(
                "a reason is required to override the store".into(),
            ));
        }

        let store = self
            .last
            .as_ref()
            .and_then(|r| r.find(store_id))
            .cloned()
            .ok_or_else(|| {
                AttendanceError::Validation(format!("unknown store '{store_id}'"))
            })?;

        info!(store = %store.id(), %reason, "store overridden manually");
        self.manual = Some(ManualOverride {
            store: store.clone(),
            reason: reason.to_string(),
            at,
        });
        Ok(store)
    }

    pub fn clear_override(&mut self) {
        self.manual = None;
    }

    pub fn manual_override(&self) -> Option<&ManualOverride> {
        self.manual.as_ref()
    }

    pub fn last_resolution(&self) -> Option<&Resolution> {
        self.last.as_ref()
    }

    /// The manual override if any, the auto-selection otherwise.
    pub fn selected_store(&self) -> Option<StoreCandidate> {
        self.manual
            .as_ref()
            .map(|m| m.store.clone())
            .or_else(|| self.last.as_ref().and_then(|r| r.auto_selected.clone()))
    }
}
