#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use chrono::{DateTime, TimeZone, Utc};
use rattendance::backend::{
    AttendanceBackend, BreakRequest, ClockInRequest, ClockOutRequest, StoreDirectory,
};
use rattendance::core::clock::ManualClock;
use rattendance::core::machine::AttendanceStateMachine;
use rattendance::core::policy::AttendancePolicy;
use rattendance::errors::{AttendanceError, AttendanceResult};
use rattendance::models::{
    AttendanceSession, Coordinates, DeviceInfo, DevicePosition, Evidence, Store, StoreCandidate,
    TrackingMethod, VerificationPayload,
};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

pub fn rti() -> Command {
    cargo_bin_cmd!("rattendance")
}

/// Create a unique test DB path inside the system temp dir and remove any existing file
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_rattendance.sqlite", name));
    let db_path = path.to_string_lossy().to_string();
    fs::remove_file(&db_path).ok();
    db_path
}

/// 2026-03-02 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0)
        .single()
        .expect("valid instant")
}

// ---------------------------
// Stores
// ---------------------------

/// Milan cathedral square.
pub const DUOMO: (f64, f64) = (45.464_2, 9.190_0);

/// A point `north_m` meters north of `origin`.
pub fn north_of(origin: (f64, f64), north_m: f64) -> Coordinates {
    let deg = north_m / 111_195.0;
    Coordinates::new(origin.0 + deg, origin.1).expect("valid coordinates")
}

pub fn store(id: &str, name: &str, coordinates: Coordinates) -> Store {
    Store {
        id: id.to_string(),
        name: name.to_string(),
        address: String::new(),
        coordinates,
    }
}

/// Store A 150 m north of the device, store B 500 m south.
pub fn sample_stores() -> Vec<Store> {
    vec![
        store("store-a", "Alpha", north_of(DUOMO, 150.0)),
        store("store-b", "Beta", north_of(DUOMO, -500.0)),
    ]
}

pub fn device_at(coordinates: Coordinates, when: DateTime<Utc>) -> DevicePosition {
    DevicePosition::new(coordinates, Some(10.0), when)
}

pub fn candidate(store: &Store) -> StoreCandidate {
    StoreCandidate::unranked(store.clone())
}

pub fn test_device() -> DeviceInfo {
    DeviceInfo {
        platform: "test".into(),
        client_version: "0.0.0".into(),
        host: "test-host".into(),
        fingerprint: "test:host".into(),
    }
}

pub fn web_payload(captured_at: DateTime<Utc>) -> VerificationPayload {
    VerificationPayload {
        method: TrackingMethod::Web,
        evidence: Evidence::Fingerprint {
            fingerprint: "test:host".into(),
        },
        captured_at,
        geo_location: None,
    }
}

// ---------------------------
// Mock backend
// ---------------------------

#[derive(Default)]
struct MockState {
    session: Option<AttendanceSession>,
    stores: Vec<Store>,
    calls: HashMap<&'static str, usize>,
    fail_next: Option<AttendanceError>,
    last_clock_in: Option<ClockInRequest>,
}

/// In-memory backend that applies transitions with the model helpers.
///
/// `gate` holds clock-in calls until released, `fail_next` makes the next
/// transition fail without touching the stored session.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stores(stores: Vec<Store>) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().stores = stores;
        mock
    }

    pub fn with_session(session: AttendanceSession) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().session = Some(session);
        mock
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    pub fn stored(&self) -> Option<AttendanceSession> {
        self.state.lock().unwrap().session.clone()
    }

    pub fn last_clock_in(&self) -> Option<ClockInRequest> {
        self.state.lock().unwrap().last_clock_in.clone()
    }

    pub fn fail_next(&self, err: AttendanceError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// Hold every clock-in until the returned handle is notified.
    pub fn hold_clock_in(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    fn record(&self, op: &'static str) -> AttendanceResult<()> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut AttendanceSession) -> AttendanceResult<()>,
    ) -> AttendanceResult<AttendanceSession> {
        let mut state = self.state.lock().unwrap();
        let session = state
            .session
            .as_mut()
            .filter(|s| s.id == session_id)
            .ok_or_else(|| AttendanceError::Validation("unknown session".into()))?;
        let mut updated = session.clone();
        f(&mut updated)?;
        *session = updated.clone();
        Ok(updated)
    }
}

impl AttendanceBackend for MockBackend {
    async fn open_session(&self, user_id: &str) -> AttendanceResult<Option<AttendanceSession>> {
        self.record("open_session")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .session
            .clone()
            .filter(|s| s.is_open() && s.user_id == user_id))
    }

    async fn clock_in(&self, request: &ClockInRequest) -> AttendanceResult<AttendanceSession> {
        self.record("clock_in")?;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.session.as_ref().is_some_and(|s| s.is_open()) {
            return Err(AttendanceError::Conflict("already open".into()));
        }
        let session = AttendanceSession::open(
            Uuid::new_v4(),
            request.user_id.clone(),
            request.store_id.clone(),
            request.tracking_method,
            request.clock_in_at,
            request.geo_location.clone(),
        );
        state.session = Some(session.clone());
        state.last_clock_in = Some(request.clone());
        Ok(session)
    }

    async fn start_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.record("start_break")?;
        self.apply(request.session_id, |s| s.begin_break(request.at))
    }

    async fn end_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.record("end_break")?;
        self.apply(request.session_id, |s| s.finish_break(request.at))
    }

    async fn clock_out(&self, request: &ClockOutRequest) -> AttendanceResult<AttendanceSession> {
        self.record("clock_out")?;
        self.apply(request.session_id, |s| {
            s.close(request.at, request.close_open_break).map(|_| ())
        })
    }
}

impl StoreDirectory for MockBackend {
    async fn list_stores(&self, _tenant_id: &str) -> AttendanceResult<Vec<Store>> {
        self.record("list_stores")?;
        Ok(self.state.lock().unwrap().stores.clone())
    }
}

// ---------------------------
// Machine fixtures
// ---------------------------

pub type TestMachine = AttendanceStateMachine<Arc<MockBackend>>;

pub fn machine_with<B: AttendanceBackend>(
    backend: B,
    clock: &ManualClock,
    policy: AttendancePolicy,
) -> AttendanceStateMachine<B> {
    AttendanceStateMachine::new("alice", backend, Arc::new(clock.clone()), policy)
        .with_device(test_device())
}

/// Idle machine at 09:00 with store A and the web method selected.
pub fn ready_machine() -> (TestMachine, Arc<MockBackend>, ManualClock) {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    let clock = ManualClock::new(at(9, 0));
    let machine = machine_with(Arc::clone(&backend), &clock, AttendancePolicy::default());
    machine.select_store(candidate(&sample_stores()[0]));
    machine.select_method(TrackingMethod::Web);
    (machine, backend, clock)
}
