use chrono::Duration;
use rattendance::core::clock::ManualClock;
use rattendance::core::machine::{AttendanceStateMachine, Phase};
use rattendance::core::policy::{AttendancePolicy, OpenBreakPolicy, OvertimeBasis};
use rattendance::errors::{AttendanceError, ErrorKind};
use rattendance::models::{AttendanceSession, TrackingMethod};
use std::sync::Arc;
use uuid::Uuid;

mod common;
use common::{
    MockBackend, at, candidate, machine_with, ready_machine, sample_stores, web_payload,
};

#[tokio::test]
async fn test_full_day_flow() {
    let (machine, backend, clock) = ready_machine();
    assert_eq!(machine.phase(), Phase::Idle);
    assert!(machine.can_clock_in());

    let session = machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    assert_eq!(session.store_id, "store-a");
    assert_eq!(session.tracking_method, TrackingMethod::Web);
    assert_eq!(session.clock_in_at, at(9, 0));
    assert_eq!(machine.phase(), Phase::Active);

    clock.set(at(12, 30));
    machine.start_break().await.unwrap();
    assert_eq!(machine.phase(), Phase::OnBreak);
    assert!(machine.can_end_break());
    assert!(!machine.can_start_break());

    clock.set(at(13, 0));
    machine.end_break().await.unwrap();
    assert_eq!(machine.phase(), Phase::Active);

    clock.set(at(17, 0));
    let outcome = machine.clock_out().await.unwrap();
    assert!(!outcome.auto_closed_break);
    assert_eq!(outcome.session.clock_out_at, Some(at(17, 0)));
    assert_eq!(outcome.session.closed_breaks(), 1);
    assert_eq!(outcome.session.work_seconds_at(at(17, 0)), 7 * 3600 + 30 * 60);

    assert_eq!(machine.phase(), Phase::Idle);
    assert!(machine.session().is_none());
    assert_eq!(backend.calls("clock_in"), 1);
    assert_eq!(backend.calls("clock_out"), 1);
}

#[tokio::test]
async fn test_clock_in_request_carries_selection_and_device() {
    let (machine, backend, _clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();

    let request = backend.last_clock_in().unwrap();
    assert_eq!(request.user_id, "alice");
    assert_eq!(request.store_id, "store-a");
    assert_eq!(request.tracking_method, TrackingMethod::Web);
    assert_eq!(request.device_info.host, "test-host");
    assert!(request.evidence.is_some());
}

#[tokio::test]
async fn test_second_clock_in_is_a_conflict() {
    let (machine, backend, clock) = ready_machine();
    let first = machine.clock_in(web_payload(at(9, 0))).await.unwrap();

    clock.set(at(9, 1));
    let err = machine.clock_in(web_payload(at(9, 1))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // the open session is untouched and nothing reached the backend
    assert_eq!(machine.session(), Some(first));
    assert_eq!(backend.calls("clock_in"), 1);
    assert_eq!(machine.phase(), Phase::Error);
}

#[tokio::test]
async fn test_transitions_rejected_in_wrong_state() {
    let (machine, backend, _clock) = ready_machine();

    let err = machine.start_break().await.unwrap_err();
    assert!(matches!(err, AttendanceError::State(_)));
    machine.clear_error();

    let err = machine.clock_out().await.unwrap_err();
    assert!(matches!(err, AttendanceError::State(_)));
    machine.clear_error();

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    let err = machine.end_break().await.unwrap_err();
    assert!(matches!(err, AttendanceError::State(_)));

    assert_eq!(backend.calls("start_break"), 0);
    assert_eq!(backend.calls("end_break"), 0);
    assert_eq!(backend.calls("clock_out"), 0);
}

#[tokio::test]
async fn test_error_overlay_blocks_until_cleared() {
    let (machine, _backend, clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();

    let err = machine.end_break().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(machine.phase(), Phase::Error);
    assert_eq!(machine.guards(), Default::default());

    // blocked while the overlay is up
    clock.set(at(10, 0));
    let blocked = machine.start_break().await.unwrap_err();
    assert!(blocked.message().contains("acknowledge"));
    assert!(machine.session().unwrap().breaks.is_empty());

    let cleared = machine.clear_error().unwrap();
    assert_eq!(cleared.kind, ErrorKind::State);
    assert_eq!(machine.phase(), Phase::Active);
    assert!(machine.clear_error().is_none());

    machine.start_break().await.unwrap();
    assert_eq!(machine.phase(), Phase::OnBreak);
}

#[tokio::test]
async fn test_clock_in_requires_store_and_method() {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    let clock = ManualClock::new(at(9, 0));
    let machine = machine_with(Arc::clone(&backend), &clock, AttendancePolicy::default());
    assert!(!machine.can_clock_in());

    let err = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert!(matches!(err, AttendanceError::Validation(ref m) if m.contains("store")));
    machine.clear_error();

    machine.select_store(candidate(&sample_stores()[0]));
    let err = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert!(matches!(err, AttendanceError::Validation(ref m) if m.contains("method")));

    assert_eq!(backend.calls("clock_in"), 0);
}

#[tokio::test]
async fn test_payload_must_match_method_and_be_fresh() {
    let (machine, backend, _clock) = ready_machine();

    machine.select_method(TrackingMethod::Gps);
    let err = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    machine.clear_error();

    machine.select_method(TrackingMethod::Web);
    let stale = web_payload(at(9, 0) - Duration::minutes(5));
    let err = machine.clock_in(stale).await.unwrap_err();
    assert!(err.message().contains("stale"));
    machine.clear_error();

    let future = web_payload(at(9, 5));
    let err = machine.clock_in(future).await.unwrap_err();
    assert!(err.message().contains("future"));
    machine.clear_error();

    // exactly at the window edge is still accepted
    let edge = web_payload(at(9, 0) - Duration::seconds(120));
    machine.clock_in(edge).await.unwrap();
    assert_eq!(backend.calls("clock_in"), 1);
}

#[tokio::test]
async fn test_transport_failure_keeps_state_and_is_retryable() {
    let (machine, backend, _clock) = ready_machine();
    backend.fail_next(AttendanceError::Transport("timeout".into()));

    let err = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(machine.session().is_none());
    assert_eq!(machine.last_error().unwrap().kind, ErrorKind::Transport);
    assert!(!machine.is_transition_pending());

    machine.clear_error();
    assert_eq!(machine.phase(), Phase::Idle);
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    assert_eq!(machine.phase(), Phase::Active);
    assert_eq!(backend.calls("clock_in"), 2);
}

#[test]
fn test_only_transport_errors_are_retryable() {
    let errors = [
        AttendanceError::Validation("x".into()),
        AttendanceError::Verification("x".into()),
        AttendanceError::Conflict("x".into()),
        AttendanceError::State("x".into()),
        AttendanceError::Preparation("x".into()),
        AttendanceError::PositionUnavailable("x".into()),
    ];
    assert!(errors.iter().all(|e| !e.is_retryable()));
    assert!(AttendanceError::Transport("x".into()).is_retryable());
}

#[tokio::test]
async fn test_backend_conflict_is_surfaced() {
    let (machine, backend, _clock) = ready_machine();
    backend.fail_next(AttendanceError::Conflict("open session on another device".into()));

    let err = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(machine.session().is_none());
}

#[tokio::test]
async fn test_concurrent_clock_in_reaches_backend_once() {
    let (machine, backend, _clock) = ready_machine();
    let machine = Arc::new(machine);
    let gate = backend.hold_clock_in();

    let first = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.clock_in(web_payload(at(9, 0))).await })
    };
    while !machine.is_transition_pending() {
        tokio::task::yield_now().await;
    }
    assert!(!machine.can_clock_in());

    let second = machine.clock_in(web_payload(at(9, 0))).await.unwrap_err();
    assert_eq!(second.kind(), ErrorKind::Conflict);
    // an in-flight rejection is not recorded as a failure
    assert!(machine.last_error().is_none());

    gate.notify_one();
    let session = first.await.unwrap().unwrap();
    assert_eq!(machine.session(), Some(session));
    assert_eq!(backend.calls("clock_in"), 1);
    assert!(!machine.is_transition_pending());
}

#[tokio::test]
async fn test_cancelled_transition_releases_pending_marker() {
    let (machine, backend, _clock) = ready_machine();
    let _gate = backend.hold_clock_in();

    let attempt = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        machine.clock_in(web_payload(at(9, 0))),
    )
    .await;
    assert!(attempt.is_err());

    assert!(!machine.is_transition_pending());
    assert_eq!(machine.phase(), Phase::Idle);
    assert!(machine.can_clock_in());
}

#[tokio::test]
async fn test_clock_out_auto_closes_running_break() {
    let (machine, _backend, clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(12, 0));
    machine.start_break().await.unwrap();

    clock.set(at(12, 20));
    assert!(machine.can_clock_out());
    let outcome = machine.clock_out().await.unwrap();
    assert!(outcome.auto_closed_break);

    let last = outcome.session.breaks.last().unwrap();
    assert_eq!(last.end, Some(at(12, 20)));
    assert_eq!(outcome.session.clock_out_at, Some(at(12, 20)));
    assert_eq!(machine.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_clock_out_rejected_on_break_when_policy_says_so() {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    let clock = ManualClock::new(at(9, 0));
    let policy = AttendancePolicy {
        open_break_policy: OpenBreakPolicy::Reject,
        ..AttendancePolicy::default()
    };
    let machine = machine_with(Arc::clone(&backend), &clock, policy);
    machine.select_store(candidate(&sample_stores()[0]));
    machine.select_method(TrackingMethod::Web);

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(12, 0));
    machine.start_break().await.unwrap();
    assert!(!machine.can_clock_out());

    clock.set(at(12, 30));
    let err = machine.clock_out().await.unwrap_err();
    assert!(matches!(err, AttendanceError::State(_)));
    assert_eq!(machine.session().unwrap().clock_out_at, None);
    assert_eq!(backend.calls("clock_out"), 0);

    machine.clear_error();
    machine.end_break().await.unwrap();
    clock.set(at(13, 0));
    let outcome = machine.clock_out().await.unwrap();
    assert!(!outcome.auto_closed_break);
}

#[tokio::test]
async fn test_hydrate_restores_break_state() {
    let mut session = AttendanceSession::open(
        Uuid::new_v4(),
        "alice",
        "store-a",
        TrackingMethod::Gps,
        at(8, 0),
        None,
    );
    session.begin_break(at(11, 0)).unwrap();

    let backend = Arc::new(MockBackend::with_session(session.clone()));
    let clock = ManualClock::new(at(11, 15));
    let machine = machine_with(backend, &clock, AttendancePolicy::default());

    assert_eq!(machine.hydrate().await.unwrap(), Phase::OnBreak);
    assert_eq!(machine.session(), Some(session));
    assert!(machine.can_end_break());
    assert!(!machine.can_clock_in());
}

#[tokio::test]
async fn test_hydrate_ignores_other_users_session() {
    let session = AttendanceSession::open(
        Uuid::new_v4(),
        "bob",
        "store-a",
        TrackingMethod::Web,
        at(8, 0),
        None,
    );
    let backend = Arc::new(MockBackend::with_session(session));
    let clock = ManualClock::new(at(9, 0));
    let machine = AttendanceStateMachine::new(
        "alice",
        backend,
        Arc::new(clock),
        AttendancePolicy::default(),
    );

    assert_eq!(machine.hydrate().await.unwrap(), Phase::Idle);
}

#[tokio::test]
async fn test_snapshots_are_published() {
    let (machine, _backend, _clock) = ready_machine();
    let mut rx = machine.subscribe();
    rx.borrow_and_update();

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    assert!(rx.has_changed().unwrap());

    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.phase(), Phase::Active);
    assert_eq!(snapshot.selected_method, Some(TrackingMethod::Web));
    assert_eq!(snapshot.session().unwrap().store_id, "store-a");
}

/// 09:00 in, no break by 15:05, break 15:05-15:20, clock-out at 17:10.
#[tokio::test]
async fn test_break_reminder_and_overtime_scenario() {
    let (machine, _backend, clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();

    clock.set(at(15, 5));
    let timers = machine.timers().unwrap();
    assert!(timers.needs_break);
    assert!(!timers.is_overtime);

    machine.start_break().await.unwrap();
    assert!(!machine.timers().unwrap().needs_break);

    clock.set(at(15, 20));
    machine.end_break().await.unwrap();

    clock.set(at(17, 10));
    let timers = machine.timers().unwrap();
    assert_eq!(timers.elapsed_seconds, 8 * 3600 + 10 * 60);
    assert_eq!(timers.break_seconds, 15 * 60);
    assert_eq!(timers.elapsed_work_seconds, 7 * 3600 + 55 * 60);
    assert!(!timers.needs_break);
    // presence basis: 8h10m since clock-in
    assert!(timers.is_overtime);

    let outcome = machine.clock_out().await.unwrap();
    let session = outcome.session;
    assert_eq!(session.breaks.len(), 1);
    assert_eq!(session.break_seconds_at(at(17, 10)), 15 * 60);
    assert!(session.clock_out_at.unwrap() > session.clock_in_at);
}

#[tokio::test]
async fn test_net_work_overtime_basis() {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    let clock = ManualClock::new(at(9, 0));
    let policy = AttendancePolicy {
        overtime_basis: OvertimeBasis::NetWork,
        ..AttendancePolicy::default()
    };
    let machine = machine_with(backend, &clock, policy);
    machine.select_store(candidate(&sample_stores()[0]));
    machine.select_method(TrackingMethod::Web);

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(15, 5));
    machine.start_break().await.unwrap();
    clock.set(at(15, 20));
    machine.end_break().await.unwrap();

    clock.set(at(17, 10));
    assert!(!machine.timers().unwrap().is_overtime);

    clock.set(at(17, 15));
    assert!(machine.timers().unwrap().is_overtime);
}

#[tokio::test]
async fn test_overtime_flips_while_still_on_break() {
    let (machine, _backend, clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();

    clock.set(at(16, 30));
    machine.start_break().await.unwrap();

    clock.set(at(16, 59));
    assert!(!machine.timers().unwrap().is_overtime);

    clock.set(at(17, 0));
    assert_eq!(machine.phase(), Phase::OnBreak);
    let timers = machine.timers().unwrap();
    assert!(timers.is_overtime);
    assert_eq!(timers.break_seconds, 30 * 60);
}

#[tokio::test]
async fn test_net_work_overtime_does_not_advance_during_a_break() {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    let clock = ManualClock::new(at(9, 0));
    let policy = AttendancePolicy {
        overtime_basis: OvertimeBasis::NetWork,
        ..AttendancePolicy::default()
    };
    let machine = machine_with(backend, &clock, policy);
    machine.select_store(candidate(&sample_stores()[0]));
    machine.select_method(TrackingMethod::Web);

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(16, 30));
    machine.start_break().await.unwrap();

    for (h, m) in [(17, 0), (18, 0)] {
        clock.set(at(h, m));
        let timers = machine.timers().unwrap();
        assert_eq!(machine.phase(), Phase::OnBreak);
        assert_eq!(timers.elapsed_work_seconds, 7 * 3600 + 30 * 60);
        assert!(!timers.is_overtime);
    }
}

#[tokio::test]
async fn test_auto_close_needs_a_break_of_nonzero_length() {
    let (machine, backend, clock) = ready_machine();
    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(12, 0));
    machine.start_break().await.unwrap();

    // clock-out in the same instant the break started
    let err = machine.clock_out().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message().contains("break must end after it started"));
    assert_eq!(backend.calls("clock_out"), 0);
    assert_eq!(machine.session().unwrap().breaks.len(), 1);

    machine.clear_error();
    assert_eq!(machine.phase(), Phase::OnBreak);

    clock.set(at(12, 1));
    let outcome = machine.clock_out().await.unwrap();
    assert!(outcome.auto_closed_break);
    assert_eq!(outcome.session.breaks[0].end, Some(at(12, 1)));
}
