use rattendance::core::geo::haversine_meters;
use rattendance::core::resolver::{FixedPosition, StoreResolver};
use rattendance::errors::{AttendanceError, ErrorKind};
use rattendance::models::Coordinates;
use std::sync::Arc;

mod common;
use common::{DUOMO, MockBackend, at, device_at, north_of, sample_stores, store};

fn resolver(radius_m: f64) -> (StoreResolver<Arc<MockBackend>>, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::with_stores(sample_stores()));
    (
        StoreResolver::new(Arc::clone(&backend), "default", radius_m),
        backend,
    )
}

fn here() -> Coordinates {
    Coordinates::new(DUOMO.0, DUOMO.1).unwrap()
}

#[test]
fn test_haversine_one_degree_of_latitude() {
    let a = Coordinates::new(45.0, 9.0).unwrap();
    let b = Coordinates::new(46.0, 9.0).unwrap();
    let d = haversine_meters(&a, &b);
    assert!((d - 111_195.0).abs() < 5.0, "got {d}");
    assert_eq!(haversine_meters(&a, &a), 0.0);
}

#[test]
fn test_coordinates_are_range_checked() {
    assert!(Coordinates::new(91.0, 0.0).is_err());
    assert!(Coordinates::new(0.0, -180.5).is_err());
    assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    assert!(Coordinates::new(-90.0, 180.0).is_ok());
}

#[tokio::test]
async fn test_nearest_store_in_geofence_is_auto_selected() {
    let (mut resolver, _backend) = resolver(200.0);
    let resolution = resolver
        .resolve(Some(device_at(here(), at(9, 0))))
        .await
        .unwrap();

    let ids: Vec<_> = resolution.candidates.iter().map(|c| c.id()).collect();
    assert_eq!(ids, ["store-a", "store-b"]);

    let a = resolution.candidates[0].distance_meters.unwrap();
    let b = resolution.candidates[1].distance_meters.unwrap();
    assert!((a - 150.0).abs() < 1.0, "got {a}");
    assert!((b - 500.0).abs() < 1.0, "got {b}");

    assert_eq!(resolution.auto_selected.unwrap().id(), "store-a");
    assert_eq!(resolver.selected_store().unwrap().id(), "store-a");
    assert!(resolution.position_unavailable.is_none());
}

#[tokio::test]
async fn test_no_store_in_range_is_not_an_error() {
    let (mut resolver, _backend) = resolver(100.0);
    let resolution = resolver
        .resolve(Some(device_at(here(), at(9, 0))))
        .await
        .unwrap();

    assert!(resolution.auto_selected.is_none());
    assert_eq!(resolution.candidates.len(), 2);
    assert_eq!(resolution.candidates[0].id(), "store-a");
    assert!(resolver.selected_store().is_none());
}

#[tokio::test]
async fn test_equal_distances_sort_by_name() {
    let backend = Arc::new(MockBackend::with_stores(vec![
        store("z", "Zeta", north_of(DUOMO, 50.0)),
        store("y", "Eta", north_of(DUOMO, 50.0)),
    ]));
    let mut resolver = StoreResolver::new(backend, "default", 200.0);
    let resolution = resolver
        .resolve(Some(device_at(here(), at(9, 0))))
        .await
        .unwrap();

    assert_eq!(resolution.candidates[0].name(), "Eta");
    assert_eq!(resolution.auto_selected.unwrap().id(), "y");
}

#[tokio::test]
async fn test_override_requires_reason_and_known_store() {
    let (mut resolver, _backend) = resolver(200.0);
    resolver
        .resolve(Some(device_at(here(), at(9, 0))))
        .await
        .unwrap();

    let err = resolver.override_store("store-b", "   ", at(9, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(resolver.selected_store().unwrap().id(), "store-a");

    let err = resolver
        .override_store("store-z", "covering a shift", at(9, 0))
        .unwrap_err();
    assert!(err.message().contains("store-z"));

    let chosen = resolver
        .override_store("store-b", "covering a shift", at(9, 0))
        .unwrap();
    assert_eq!(chosen.id(), "store-b");
    assert_eq!(resolver.selected_store().unwrap().id(), "store-b");
    assert_eq!(
        resolver.manual_override().unwrap().reason,
        "covering a shift"
    );

    resolver.clear_override();
    assert_eq!(resolver.selected_store().unwrap().id(), "store-a");
}

#[tokio::test]
async fn test_new_resolution_drops_override() {
    let (mut resolver, backend) = resolver(200.0);
    resolver
        .resolve(Some(device_at(here(), at(9, 0))))
        .await
        .unwrap();
    resolver
        .override_store("store-b", "inventory", at(9, 0))
        .unwrap();

    resolver
        .resolve(Some(device_at(here(), at(9, 5))))
        .await
        .unwrap();
    assert!(resolver.manual_override().is_none());
    assert_eq!(resolver.selected_store().unwrap().id(), "store-a");
    assert_eq!(backend.calls("list_stores"), 2);
}

#[tokio::test]
async fn test_unavailable_position_degrades_to_manual_selection() {
    let (mut resolver, _backend) = resolver(200.0);
    let resolution = resolver.resolve_from(&FixedPosition(None)).await.unwrap();

    assert!(resolution.position_unavailable.is_some());
    assert!(resolution.auto_selected.is_none());
    assert!(resolution.candidates.iter().all(|c| c.distance_meters.is_none()));
    // without distances the list is alphabetical
    assert_eq!(resolution.candidates[0].name(), "Alpha");

    let chosen = resolver
        .override_store("store-b", "gps denied", at(9, 0))
        .unwrap();
    assert_eq!(chosen.id(), "store-b");
}

#[tokio::test]
async fn test_update_position_reranks_without_refetching() {
    let (mut resolver, backend) = resolver(200.0);
    resolver
        .resolve_from(&FixedPosition(Some(device_at(here(), at(9, 0)))))
        .await
        .unwrap();

    let near_b = north_of(DUOMO, -450.0);
    let resolution = resolver
        .update_position(device_at(near_b, at(9, 10)))
        .unwrap();

    assert_eq!(resolution.auto_selected.unwrap().id(), "store-b");
    assert_eq!(resolver.position().unwrap().coordinates, near_b);
    assert_eq!(backend.calls("list_stores"), 1);
}

#[tokio::test]
async fn test_update_position_before_resolve_is_none() {
    let (mut resolver, _backend) = resolver(200.0);
    assert!(resolver.update_position(device_at(here(), at(9, 0))).is_none());
}

#[tokio::test]
async fn test_directory_failure_is_propagated() {
    let (mut resolver, backend) = resolver(200.0);
    backend.fail_next(AttendanceError::Transport("directory down".into()));

    let err = resolver.resolve(None).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(resolver.last_resolution().is_none());
}
