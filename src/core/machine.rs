//! The attendance state machine.
//!
//! States are a tagged union (`Idle`, `Active(session)`, `OnBreak(session)`)
//! with a transient error overlay on top. All state lives behind one mutex
//! that is never held across an await; every accepted change is published as
//! a whole [`MachineSnapshot`] on a watch channel, which is what the timer
//! ticker reads.
//!
//! A transition runs in three steps:
//! 1. `begin`: reject if another transition is in flight or an error is
//!    unacknowledged, run the guard, dry-run the mutation on a copy of the
//!    session and build the backend request;
//! 2. the backend call (the only suspension point);
//! 3. `finish`: install the session returned by the backend, or record the
//!    failure in the overlay. Nothing is mutated before step 3, so a failed
//!    or cancelled call leaves the pre-attempt state in place.

use crate::backend::{AttendanceBackend, BreakRequest, ClockInRequest, ClockOutRequest};
use crate::core::clock::Clock;
use crate::core::policy::{AttendancePolicy, OpenBreakPolicy};
use crate::core::timers::{DerivedTimers, TimerTicker};
use crate::errors::{AttendanceError, AttendanceResult, ErrorKind};
use crate::models::{
    AttendanceSession, DeviceInfo, StoreCandidate, TrackingMethod, VerificationPayload,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceState {
    Idle,
    Active(AttendanceSession),
    OnBreak(AttendanceSession),
}

impl AttendanceState {
    /// Derive the state from the open session held by the backend, if any.
    pub fn from_session(session: Option<AttendanceSession>) -> Self {
        match session {
            Some(s) if s.is_open() && s.is_on_break() => AttendanceState::OnBreak(s),
            Some(s) if s.is_open() => AttendanceState::Active(s),
            _ => AttendanceState::Idle,
        }
    }

    pub fn session(&self) -> Option<&AttendanceSession> {
        match self {
            AttendanceState::Idle => None,
            AttendanceState::Active(s) | AttendanceState::OnBreak(s) => Some(s),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            AttendanceState::Idle => Phase::Idle,
            AttendanceState::Active(_) => Phase::Active,
            AttendanceState::OnBreak(_) => Phase::OnBreak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Active,
    OnBreak,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Active => "active",
            Phase::OnBreak => "on_break",
            Phase::Error => "error",
        }
    }
}

/// The last failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorOverlay {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AttendanceError> for ErrorOverlay {
    fn from(err: &AttendanceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub state: AttendanceState,
    pub error: Option<ErrorOverlay>,
    pub selected_store: Option<StoreCandidate>,
    pub selected_method: Option<TrackingMethod>,
}

impl MachineSnapshot {
    /// `Error` while an overlay is present, the underlying state otherwise.
    pub fn phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Error
        } else {
            self.state.phase()
        }
    }

    pub fn session(&self) -> Option<&AttendanceSession> {
        self.state.session()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guards {
    pub can_clock_in: bool,
    pub can_clock_out: bool,
    pub can_start_break: bool,
    pub can_end_break: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ClockIn,
    StartBreak,
    EndBreak,
    ClockOut,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::ClockIn => "clock-in",
            Transition::StartBreak => "break start",
            Transition::EndBreak => "break end",
            Transition::ClockOut => "clock-out",
        }
    }

    fn reflected_by(&self, session: &AttendanceSession) -> bool {
        match self {
            Transition::ClockIn | Transition::EndBreak => {
                session.is_open() && !session.is_on_break()
            }
            Transition::StartBreak => session.is_on_break(),
            Transition::ClockOut => !session.is_open(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockOutOutcome {
    pub session: AttendanceSession,
    pub auto_closed_break: bool,
}

#[derive(Debug)]
struct Inner {
    state: AttendanceState,
    error: Option<ErrorOverlay>,
    selected_store: Option<StoreCandidate>,
    selected_method: Option<TrackingMethod>,
    pending: Option<Transition>,
}

impl Inner {
    fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            state: self.state.clone(),
            error: self.error.clone(),
            selected_store: self.selected_store.clone(),
            selected_method: self.selected_method,
        }
    }

    fn guards(&self, policy: &AttendancePolicy) -> Guards {
        let free = self.error.is_none() && self.pending.is_none();
        let idle = matches!(self.state, AttendanceState::Idle);
        let active = matches!(self.state, AttendanceState::Active(_));
        let on_break = matches!(self.state, AttendanceState::OnBreak(_));

        Guards {
            can_clock_in: free
                && idle
                && self.selected_store.is_some()
                && self.selected_method.is_some(),
            can_clock_out: free
                && (active
                    || (on_break && policy.open_break_policy == OpenBreakPolicy::AutoClose)),
            can_start_break: free && active,
            can_end_break: free && on_break,
        }
    }
}

/// Marks a transition as in flight. Clears the marker when dropped without
/// being finished, so a cancelled backend call does not wedge the machine.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.pending = None;
        }
    }
}

pub struct AttendanceStateMachine<B> {
    user_id: String,
    backend: B,
    clock: Arc<dyn Clock>,
    policy: AttendancePolicy,
    device: DeviceInfo,
    inner: Mutex<Inner>,
    snapshots: watch::Sender<MachineSnapshot>,
    ticker: Mutex<Option<TimerTicker>>,
}

impl<B: AttendanceBackend> AttendanceStateMachine<B> {
    pub fn new(
        user_id: impl Into<String>,
        backend: B,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
    ) -> Self {
        let inner = Inner {
            state: AttendanceState::Idle,
            error: None,
            selected_store: None,
            selected_method: None,
            pending: None,
        };
        let (snapshots, _) = watch::channel(inner.snapshot());

        Self {
            user_id: user_id.into(),
            backend,
            clock,
            policy,
            device: DeviceInfo::detect(),
            inner: Mutex::new(inner),
            snapshots,
            ticker: Mutex::new(None),
        }
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load the user's open session from the backend and derive the state from it.
    pub async fn hydrate(&self) -> AttendanceResult<Phase> {
        if let Some(pending) = self.lock().pending {
            return Err(AttendanceError::Conflict(format!(
                "{} is in progress",
                pending.as_str()
            )));
        }

        let found = self.backend.open_session(&self.user_id).await?;
        if let Some(session) = &found {
            self.check_ownership(session)?;
        }

        let mut inner = self.lock();
        inner.state = AttendanceState::from_session(found);
        self.publish(&inner);
        debug!(user = %self.user_id, phase = inner.state.phase().as_str(), "hydrated");
        Ok(inner.state.phase())
    }

    // ---------------------------
    // Selections
    // ---------------------------

    pub fn select_method(&self, method: TrackingMethod) {
        let mut inner = self.lock();
        inner.selected_method = Some(method);
        self.publish(&inner);
    }

    pub fn select_store(&self, store: StoreCandidate) {
        let mut inner = self.lock();
        inner.selected_store = Some(store);
        self.publish(&inner);
    }

    pub fn selected_method(&self) -> Option<TrackingMethod> {
        self.lock().selected_method
    }

    pub fn selected_store(&self) -> Option<StoreCandidate> {
        self.lock().selected_store.clone()
    }

    // ---------------------------
    // Outbound view
    // ---------------------------

    pub fn snapshot(&self) -> MachineSnapshot {
        self.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<MachineSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.snapshot().phase()
    }

    pub fn session(&self) -> Option<AttendanceSession> {
        self.lock().state.session().cloned()
    }

    pub fn last_error(&self) -> Option<ErrorOverlay> {
        self.lock().error.clone()
    }

    pub fn guards(&self) -> Guards {
        self.lock().guards(&self.policy)
    }

    pub fn can_clock_in(&self) -> bool {
        self.guards().can_clock_in
    }

    pub fn can_clock_out(&self) -> bool {
        self.guards().can_clock_out
    }

    pub fn can_start_break(&self) -> bool {
        self.guards().can_start_break
    }

    pub fn can_end_break(&self) -> bool {
        self.guards().can_end_break
    }

    pub fn is_transition_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Timers as of now, `None` while idle.
    pub fn timers(&self) -> Option<DerivedTimers> {
        let inner = self.lock();
        inner
            .state
            .session()
            .map(|s| DerivedTimers::compute(s, self.clock.now(), &self.policy))
    }

    // ---------------------------
    // Ticker
    // ---------------------------

    /// Start (or restart) the ticker. Must be called inside a tokio runtime.
    pub fn start_ticker(&self) -> watch::Receiver<DerivedTimers> {
        let (ticker, rx) = TimerTicker::spawn(
            self.snapshots.subscribe(),
            Arc::clone(&self.clock),
            self.policy.clone(),
        );
        *self.ticker.lock().unwrap_or_else(PoisonError::into_inner) = Some(ticker);
        rx
    }

    pub fn stop_ticker(&self) {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            ticker.stop();
        }
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(TimerTicker::is_running)
    }

    // ---------------------------
    // Transitions
    // ---------------------------

    pub async fn clock_in(
        &self,
        payload: VerificationPayload,
    ) -> AttendanceResult<AttendanceSession> {
        let (request, flight) = self.begin(Transition::ClockIn, |inner, now| {
            if inner.state.session().is_some() {
                return Err(AttendanceError::Conflict(
                    "an attendance session is already open for this user".into(),
                ));
            }
            let store = inner
                .selected_store
                .as_ref()
                .ok_or_else(|| AttendanceError::Validation("no store selected".into()))?;
            let method = inner.selected_method.ok_or_else(|| {
                AttendanceError::Validation("no tracking method selected".into())
            })?;

            payload.check(method, now, self.policy.verification_window)?;

            Ok(ClockInRequest {
                user_id: self.user_id.clone(),
                store_id: store.id().to_string(),
                tracking_method: method,
                clock_in_at: now,
                geo_location: payload.geo_location.clone(),
                device_info: self.device.clone(),
                evidence: Some(payload.evidence.clone()),
            })
        })?;

        let outcome = self.backend.clock_in(&request).await;
        let session = self.finish(flight, Transition::ClockIn, outcome)?;

        info!(
            user = %self.user_id,
            session = %session.id,
            store = %session.store_id,
            method = %session.tracking_method,
            "clocked in"
        );
        Ok(session)
    }

    pub async fn start_break(&self) -> AttendanceResult<AttendanceSession> {
        let (request, flight) = self.begin(Transition::StartBreak, |inner, now| {
            let session = match &inner.state {
                AttendanceState::Active(s) => s,
                AttendanceState::OnBreak(_) => {
                    return Err(AttendanceError::State("a break is already running".into()));
                }
                AttendanceState::Idle => {
                    return Err(AttendanceError::State("not clocked in".into()));
                }
            };
            session.clone().begin_break(now)?;

            Ok(BreakRequest {
                session_id: session.id,
                user_id: self.user_id.clone(),
                at: now,
            })
        })?;

        let outcome = self.backend.start_break(&request).await;
        let session = self.finish(flight, Transition::StartBreak, outcome)?;

        info!(user = %self.user_id, session = %session.id, "break started");
        Ok(session)
    }

    pub async fn end_break(&self) -> AttendanceResult<AttendanceSession> {
        let (request, flight) = self.begin(Transition::EndBreak, |inner, now| {
            let session = match &inner.state {
                AttendanceState::OnBreak(s) => s,
                AttendanceState::Active(_) => {
                    return Err(AttendanceError::State("no break is running".into()));
                }
                AttendanceState::Idle => {
                    return Err(AttendanceError::State("not clocked in".into()));
                }
            };
            session.clone().finish_break(now)?;

            Ok(BreakRequest {
                session_id: session.id,
                user_id: self.user_id.clone(),
                at: now,
            })
        })?;

        let outcome = self.backend.end_break(&request).await;
        let session = self.finish(flight, Transition::EndBreak, outcome)?;

        info!(user = %self.user_id, session = %session.id, "break ended");
        Ok(session)
    }

    pub async fn clock_out(&self) -> AttendanceResult<ClockOutOutcome> {
        let close_open_break = self.policy.open_break_policy == OpenBreakPolicy::AutoClose;

        let ((request, auto_closed_break), flight) =
            self.begin(Transition::ClockOut, |inner, now| {
                let session = inner
                    .state
                    .session()
                    .ok_or_else(|| AttendanceError::State("not clocked in".into()))?;
                let auto_closed = session.clone().close(now, close_open_break)?;

                Ok((
                    ClockOutRequest {
                        session_id: session.id,
                        user_id: self.user_id.clone(),
                        at: now,
                        close_open_break,
                    },
                    auto_closed,
                ))
            })?;

        let outcome = self.backend.clock_out(&request).await;
        let session = self.finish(flight, Transition::ClockOut, outcome)?;
        self.stop_ticker();

        if auto_closed_break {
            warn!(
                user = %self.user_id,
                session = %session.id,
                "running break closed automatically at clock-out"
            );
        }
        info!(user = %self.user_id, session = %session.id, "clocked out");

        Ok(ClockOutOutcome {
            session,
            auto_closed_break,
        })
    }

    /// Acknowledge the last error and return to the underlying state.
    pub fn clear_error(&self) -> Option<ErrorOverlay> {
        let mut inner = self.lock();
        let cleared = inner.error.take();
        if cleared.is_some() {
            self.publish(&inner);
        }
        cleared
    }

    // ---------------------------
    // Internals
    // ---------------------------

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.snapshots.send_replace(inner.snapshot());
    }

    fn begin<R>(
        &self,
        transition: Transition,
        check: impl FnOnce(&Inner, chrono::DateTime<chrono::Utc>) -> AttendanceResult<R>,
    ) -> AttendanceResult<(R, InFlight<'_>)> {
        let mut inner = self.lock();

        if let Some(pending) = inner.pending {
            debug!(
                user = %self.user_id,
                rejected = transition.as_str(),
                pending = pending.as_str(),
                "transition already in flight"
            );
            return Err(AttendanceError::Conflict(format!(
                "{} is already in progress",
                pending.as_str()
            )));
        }
        if let Some(overlay) = &inner.error {
            return Err(AttendanceError::State(format!(
                "acknowledge the pending {} error first",
                overlay.kind
            )));
        }

        match check(&inner, self.clock.now()) {
            Ok(value) => {
                inner.pending = Some(transition);
                Ok((
                    value,
                    InFlight {
                        inner: &self.inner,
                        armed: true,
                    },
                ))
            }
            Err(err) => {
                self.fail(&mut inner, transition, &err);
                Err(err)
            }
        }
    }

    fn finish(
        &self,
        mut flight: InFlight<'_>,
        transition: Transition,
        outcome: AttendanceResult<AttendanceSession>,
    ) -> AttendanceResult<AttendanceSession> {
        let mut inner = self.lock();
        inner.pending = None;
        flight.armed = false;

        match outcome.and_then(|s| self.accept(transition, s)) {
            Ok(session) => {
                inner.state = AttendanceState::from_session(Some(session.clone()));
                self.publish(&inner);
                Ok(session)
            }
            Err(err) => {
                self.fail(&mut inner, transition, &err);
                Err(err)
            }
        }
    }

    fn fail(&self, inner: &mut Inner, transition: Transition, err: &AttendanceError) {
        warn!(
            user = %self.user_id,
            transition = transition.as_str(),
            kind = %err.kind(),
            retryable = err.is_retryable(),
            "{}",
            err.message()
        );
        inner.error = Some(ErrorOverlay::from(err));
        self.publish(inner);
    }

    fn check_ownership(&self, session: &AttendanceSession) -> AttendanceResult<()> {
        if session.user_id != self.user_id {
            return Err(AttendanceError::Transport(format!(
                "backend returned session {} of another user",
                session.id
            )));
        }
        session.check_invariants().map_err(|e| {
            AttendanceError::Transport(format!(
                "backend returned an inconsistent session: {}",
                e.message()
            ))
        })
    }

    fn accept(
        &self,
        transition: Transition,
        session: AttendanceSession,
    ) -> AttendanceResult<AttendanceSession> {
        self.check_ownership(&session)?;
        if !transition.reflected_by(&session) {
            return Err(AttendanceError::Transport(format!(
                "backend answer does not reflect the {}",
                transition.as_str()
            )));
        }
        Ok(session)
    }
}
