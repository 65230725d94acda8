use rattendance::backend::{
    AttendanceBackend, BreakRequest, ClockInRequest, ClockOutRequest, StoreDirectory,
};
use rattendance::core::clock::ManualClock;
use rattendance::core::machine::Phase;
use rattendance::core::policy::AttendancePolicy;
use rattendance::db::initialize::init_db;
use rattendance::db::local::LocalBackend;
use rattendance::db::log::load_log;
use rattendance::db::migrate::latest_version;
use rattendance::db::pool::DbPool;
use rattendance::errors::{AppError, AttendanceError, ErrorKind};
use rattendance::models::{Evidence, TrackingMethod};
use std::sync::Arc;
use uuid::Uuid;

mod common;
use common::{at, candidate, machine_with, sample_stores, setup_test_db, test_device, web_payload};

fn backend() -> LocalBackend {
    let backend = LocalBackend::in_memory("default").unwrap();
    for s in sample_stores() {
        backend.add_store(&s).unwrap();
    }
    backend
}

fn clock_in_request(user: &str, store: &str, h: u32) -> ClockInRequest {
    ClockInRequest {
        user_id: user.into(),
        store_id: store.into(),
        tracking_method: TrackingMethod::Nfc,
        clock_in_at: at(h, 0),
        geo_location: None,
        device_info: test_device(),
        evidence: Some(Evidence::NfcTag {
            tag_id: "04:A2".into(),
        }),
    }
}

fn break_request(session_id: Uuid, h: u32, m: u32) -> BreakRequest {
    BreakRequest {
        session_id,
        user_id: "alice".into(),
        at: at(h, m),
    }
}

#[test]
fn test_migrations_apply_once() {
    let pool = DbPool::in_memory().unwrap();
    let applied = init_db(&pool.conn).unwrap();
    assert_eq!(applied.last().copied(), Some(latest_version()));
    assert!(init_db(&pool.conn).unwrap().is_empty());

    let log = load_log(&pool.conn).unwrap();
    assert_eq!(
        log.iter()
            .filter(|e| e.operation == "migration_applied")
            .count(),
        applied.len()
    );
}

#[test]
fn test_store_management() {
    let backend = backend();
    let stores = backend.stores().unwrap();
    assert_eq!(stores.len(), 2);
    assert_eq!(stores[0].name, "Alpha");
    assert_eq!(stores[0].coordinates, sample_stores()[0].coordinates);

    let err = backend.add_store(&sample_stores()[0]).unwrap_err();
    assert!(matches!(
        err,
        AppError::Attendance(AttendanceError::Conflict(_))
    ));

    assert!(backend.remove_store("store-b").unwrap());
    assert!(!backend.remove_store("store-b").unwrap());
    assert_eq!(backend.stores().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stores_are_scoped_by_tenant() {
    let backend = backend();
    assert_eq!(backend.list_stores("default").await.unwrap().len(), 2);
    assert!(backend.list_stores("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_one_open_session_per_user() {
    let backend = backend();
    let session = backend
        .clock_in(&clock_in_request("alice", "store-a", 9))
        .await
        .unwrap();
    assert!(session.is_open());

    let err = backend
        .clock_in(&clock_in_request("alice", "store-b", 10))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // another user is unaffected
    backend
        .clock_in(&clock_in_request("bob", "store-b", 10))
        .await
        .unwrap();

    let open = backend.open_session("alice").await.unwrap().unwrap();
    assert_eq!(open.id, session.id);
    assert_eq!(open.store_id, "store-a");
}

#[tokio::test]
async fn test_unknown_store_is_rejected() {
    let backend = backend();
    let err = backend
        .clock_in(&clock_in_request("alice", "store-z", 9))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Validation(ref m) if m.contains("store-z")));
    assert!(backend.open_session("alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_breaks_and_clock_out_are_persisted() {
    let backend = backend();
    let session = backend
        .clock_in(&clock_in_request("alice", "store-a", 9))
        .await
        .unwrap();

    backend
        .start_break(&break_request(session.id, 12, 0))
        .await
        .unwrap();
    let err = backend
        .start_break(&break_request(session.id, 12, 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let on_break = backend.open_session("alice").await.unwrap().unwrap();
    assert!(on_break.is_on_break());

    let after = backend
        .end_break(&break_request(session.id, 12, 30))
        .await
        .unwrap();
    assert_eq!(after.breaks.len(), 1);
    assert_eq!(after.breaks[0].end, Some(at(12, 30)));

    backend
        .start_break(&break_request(session.id, 15, 0))
        .await
        .unwrap();
    let closed = backend
        .clock_out(&ClockOutRequest {
            session_id: session.id,
            user_id: "alice".into(),
            at: at(15, 10),
            close_open_break: true,
        })
        .await
        .unwrap();

    assert_eq!(closed.clock_out_at, Some(at(15, 10)));
    assert_eq!(closed.breaks.len(), 2);
    assert_eq!(closed.breaks[1].end, Some(at(15, 10)));
    assert!(closed.check_invariants().is_ok());
    assert!(backend.open_session("alice").await.unwrap().is_none());

    let history = backend.recent_sessions("alice", 5).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], closed);
}

#[tokio::test]
async fn test_clock_out_refused_with_open_break_when_not_closing() {
    let backend = backend();
    let session = backend
        .clock_in(&clock_in_request("alice", "store-a", 9))
        .await
        .unwrap();
    backend
        .start_break(&break_request(session.id, 12, 0))
        .await
        .unwrap();

    let err = backend
        .clock_out(&ClockOutRequest {
            session_id: session.id,
            user_id: "alice".into(),
            at: at(13, 0),
            close_open_break: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(backend.open_session("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn test_transitions_check_session_owner() {
    let backend = backend();
    let session = backend
        .clock_in(&clock_in_request("bob", "store-a", 9))
        .await
        .unwrap();

    let err = backend
        .start_break(&break_request(session.id, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = backend
        .start_break(&break_request(Uuid::new_v4(), 10, 0))
        .await
        .unwrap_err();
    assert!(err.message().contains("unknown session"));
}

#[tokio::test]
async fn test_machine_over_sqlite() {
    let db_path = setup_test_db("machine_over_sqlite");
    let backend = Arc::new(LocalBackend::open(&db_path, "default").unwrap());
    for s in sample_stores() {
        backend.add_store(&s).unwrap();
    }

    let clock = ManualClock::new(at(9, 0));
    let machine = machine_with(Arc::clone(&backend), &clock, AttendancePolicy::default());
    machine.select_store(candidate(&sample_stores()[1]));
    machine.select_method(TrackingMethod::Web);

    machine.clock_in(web_payload(at(9, 0))).await.unwrap();
    clock.set(at(13, 0));
    machine.start_break().await.unwrap();

    // a fresh machine sees the same state
    let other = machine_with(Arc::clone(&backend), &clock, AttendancePolicy::default());
    assert_eq!(other.hydrate().await.unwrap(), Phase::OnBreak);
    assert_eq!(other.session(), machine.session());

    clock.set(at(18, 0));
    let outcome = machine.clock_out().await.unwrap();
    assert!(outcome.auto_closed_break);
    assert_eq!(outcome.session.store_id, "store-b");

    let pool = DbPool::new(&db_path).unwrap();
    let ops: Vec<String> = load_log(&pool.conn)
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    for op in ["store_add", "clock_in", "break_start", "clock_out"] {
        assert!(ops.iter().any(|o| o == op), "missing {op} in {ops:?}");
    }
}
