//! Contract with the system of record.
//!
//! The state machine only talks to an [`AttendanceBackend`]; the store
//! resolver only talks to a [`StoreDirectory`]. Two implementations ship with
//! the crate: [`crate::db::local::LocalBackend`] (SQLite) and
//! [`http::HttpBackend`] (JSON over HTTP); [`Backend`] picks one at runtime.

pub mod http;

use crate::errors::AttendanceResult;
use crate::models::{
    AttendanceSession, DeviceInfo, Evidence, GeoSnapshot, Store, TrackingMethod,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInRequest {
    pub user_id: String,
    pub store_id: String,
    pub tracking_method: TrackingMethod,
    pub clock_in_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoSnapshot>,
    pub device_info: DeviceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakRequest {
    #[serde(skip)]
    pub session_id: Uuid,
    pub user_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockOutRequest {
    #[serde(skip)]
    pub session_id: Uuid,
    pub user_id: String,
    pub at: DateTime<Utc>,
    pub close_open_break: bool,
}

/// Transition endpoints. Every call answers with the persisted session.
pub trait AttendanceBackend: Send + Sync {
    fn open_session(
        &self,
        user_id: &str,
    ) -> impl Future<Output = AttendanceResult<Option<AttendanceSession>>> + Send;

    fn clock_in(
        &self,
        request: &ClockInRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send;

    fn start_break(
        &self,
        request: &BreakRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send;

    fn end_break(
        &self,
        request: &BreakRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send;

    fn clock_out(
        &self,
        request: &ClockOutRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send;
}

/// Candidate stores of a tenant.
pub trait StoreDirectory: Send + Sync {
    fn list_stores(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = AttendanceResult<Vec<Store>>> + Send;
}

impl<T: AttendanceBackend> AttendanceBackend for Arc<T> {
    fn open_session(
        &self,
        user_id: &str,
    ) -> impl Future<Output = AttendanceResult<Option<AttendanceSession>>> + Send {
        (**self).open_session(user_id)
    }

    fn clock_in(
        &self,
        request: &ClockInRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send {
        (**self).clock_in(request)
    }

    fn start_break(
        &self,
        request: &BreakRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send {
        (**self).start_break(request)
    }

    fn end_break(
        &self,
        request: &BreakRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send {
        (**self).end_break(request)
    }

    fn clock_out(
        &self,
        request: &ClockOutRequest,
    ) -> impl Future<Output = AttendanceResult<AttendanceSession>> + Send {
        (**self).clock_out(request)
    }
}

impl<T: StoreDirectory> StoreDirectory for Arc<T> {
    fn list_stores(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = AttendanceResult<Vec<Store>>> + Send {
        (**self).list_stores(tenant_id)
    }
}

/// The backend chosen by configuration at runtime.
#[derive(Clone)]
pub enum Backend {
    Local(Arc<crate::db::local::LocalBackend>),
    Http(http::HttpBackend),
}

impl AttendanceBackend for Backend {
    async fn open_session(&self, user_id: &str) -> AttendanceResult<Option<AttendanceSession>> {
        match self {
            Backend::Local(b) => b.open_session(user_id).await,
            Backend::Http(b) => b.open_session(user_id).await,
        }
    }

    async fn clock_in(&self, request: &ClockInRequest) -> AttendanceResult<AttendanceSession> {
        match self {
            Backend::Local(b) => b.clock_in(request).await,
            Backend::Http(b) => b.clock_in(request).await,
        }
    }

    async fn start_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        match self {
            Backend::Local(b) => b.start_break(request).await,
            Backend::Http(b) => b.start_break(request).await,
        }
    }

    async fn end_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        match self {
            Backend::Local(b) => b.end_break(request).await,
            Backend::Http(b) => b.end_break(request).await,
        }
    }

    async fn clock_out(&self, request: &ClockOutRequest) -> AttendanceResult<AttendanceSession> {
        match self {
            Backend::Local(b) => b.clock_out(request).await,
            Backend::Http(b) => b.clock_out(request).await,
        }
    }
}

impl StoreDirectory for Backend {
    async fn list_stores(&self, tenant_id: &str) -> AttendanceResult<Vec<Store>> {
        match self {
            Backend::Local(b) => b.list_stores(tenant_id).await,
            Backend::Http(b) => b.list_stores(tenant_id).await,
        }
    }
}
