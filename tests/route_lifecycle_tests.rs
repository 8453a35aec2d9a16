use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use route_execution::cache::{ActiveTrackerCache, TrackerCacheConfig};
use route_execution::controllers::{LifecycleSettings, RouteLifecycleController};
use route_execution::models::{
    ActionKind, ChecklistItem, Coordinates, Driver, JobLeg, LocationPoint, PhotoCategory, PhotoRef, Route, RouteState,
    RouteStatus, Stop, StopStatus, StopType, TrackingStatus, TransportJob, TransportJobStatus,
    Truck, TruckStatus, Vehicle, VehicleStatus,
};
use route_execution::repositories::{InMemoryAuditLog, InMemoryStore, StoreCollection, TransportStore};
use route_execution::services::geocoding_service::{DistanceEstimate, GeocodedAddress};
use route_execution::services::{
    DisabledGeocoder, GeocodingProvider, TrackingLedgerService, TransitionContext,
};
use route_execution::utils::errors::AppError;

struct Harness {
    store: Arc<InMemoryStore>,
    audit: Arc<InMemoryAuditLog>,
    controller: Arc<RouteLifecycleController>,
}

/// Geocoder lento: deja abierta la ventana entre la comprobación del
/// conductor y la escritura de la ruta
struct DelayedGeocoder;

#[async_trait]
impl GeocodingProvider for DelayedGeocoder {
    async fn geocode(&self, _address: &str) -> Option<GeocodedAddress> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Some(GeocodedAddress {
            coordinates: Coordinates { latitude: 45.764, longitude: 4.8357 },
            formatted_address: None,
        })
    }

    async fn distance(&self, _from: Coordinates, _to: Coordinates) -> Option<DistanceEstimate> {
        None
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_geocoder(Arc::new(DisabledGeocoder))
    }

    fn with_geocoder(geocoder: Arc<dyn GeocodingProvider>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let cache = Arc::new(ActiveTrackerCache::new(TrackerCacheConfig::default()));
        let ledger = TrackingLedgerService::new(store.clone(), audit.clone(), cache);
        let controller = Arc::new(RouteLifecycleController::new(
            store.clone(),
            ledger,
            geocoder,
            LifecycleSettings::default(),
        ));
        Self { store, audit, controller }
    }

    async fn driver_and_truck(&self) -> (Driver, Truck) {
        let driver = Driver::new("Léa Martin");
        let truck = Truck::new("GH-456-JK");
        self.store.insert_driver(driver.clone()).await;
        self.store.insert_truck(truck.clone()).await;
        (driver, truck)
    }

    async fn vehicle(&self) -> Vehicle {
        let vehicle = Vehicle::new(Some("VF1RFB00X12345678".to_string()));
        self.store.insert_vehicle(vehicle.clone()).await;
        vehicle
    }

    /// Ruta start -> pickup -> drop -> end para un único job
    async fn single_job_route(&self, driver: &Driver, truck: &Truck, vehicle: &Vehicle) -> (Route, TransportJob) {
        let mut job = TransportJob::new(vehicle.id, None, None);
        let route = Route::new(
            driver.id,
            truck.id,
            vec![
                Stop::new(StopType::Start, 1, None),
                Stop::new(StopType::Pickup, 2, Some(job.id)),
                Stop::new(StopType::Drop, 3, Some(job.id)),
                Stop::new(StopType::End, 4, None),
            ],
        );
        job.pickup_route_id = Some(route.id);
        job.drop_route_id = Some(route.id);
        self.store.insert_route(route.clone()).await;
        self.store.insert_transport_job(job.clone()).await;
        (route, job)
    }

    async fn route(&self, id: Uuid) -> Route {
        self.store.find_route(id).await.unwrap().unwrap()
    }

    async fn job(&self, id: Uuid) -> TransportJob {
        self.store.find_transport_job(id).await.unwrap().unwrap()
    }

    async fn vehicle_status(&self, id: Uuid) -> VehicleStatus {
        self.store.find_vehicle(id).await.unwrap().unwrap().status
    }
}

fn with_checklist(driver_id: Uuid) -> TransitionContext {
    TransitionContext {
        checklist: Some(vec![
            ChecklistItem {
                label: "Exterior inspected".to_string(),
                checked: true,
                notes: None,
            },
            ChecklistItem {
                label: "Keys received".to_string(),
                checked: true,
                notes: Some("two sets".to_string()),
            },
        ]),
        ..TransitionContext::for_driver(driver_id)
    }
}

fn skip_because(driver_id: Uuid, reason: &str) -> TransitionContext {
    TransitionContext {
        reason: Some(reason.to_string()),
        ..TransitionContext::for_driver(driver_id)
    }
}

fn ping(latitude: f64, longitude: f64) -> LocationPoint {
    LocationPoint {
        timestamp: Utc::now(),
        latitude,
        longitude,
        accuracy: Some(8.0),
        speed: Some(50.0),
        heading: None,
    }
}

fn vehicle_photo(url: &str) -> PhotoRef {
    PhotoRef {
        url: url.to_string(),
        category: PhotoCategory::Vehicle,
        uploaded_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_full_route_delivers_job_and_vehicle() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, job) = h.single_job_route(&driver, &truck, &vehicle).await;
    let stops: Vec<Uuid> = route.stops.iter().map(|s| s.id).collect();

    let started = h.controller.start_route(route.id, driver.id).await.unwrap();
    assert_eq!(started.status, RouteStatus::InProgress);
    assert_eq!(started.state, Some(RouteState::Started));
    assert_eq!(started.stops[0].status, StopStatus::InProgress);
    assert_eq!(
        h.store.find_driver(driver.id).await.unwrap().unwrap().current_route_id,
        Some(route.id)
    );
    assert_eq!(h.store.find_truck(truck.id).await.unwrap().unwrap().status, TruckStatus::InUse);

    // start -> la recogida pasa a estar en curso
    let outcome = h
        .controller
        .complete_stop(route.id, stops[0], TransitionContext::for_driver(driver.id))
        .await
        .unwrap();
    assert_eq!(outcome.promoted_stop_id, Some(stops[1]));
    assert_eq!(h.job(job.id).await.status, TransportJobStatus::Dispatched);
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Dispatched);

    h.controller
        .attach_photo(route.id, stops[1], driver.id, vehicle_photo("https://blob/pickup-front.jpg"))
        .await
        .unwrap();
    h.controller
        .attach_photo(
            route.id,
            stops[1],
            driver.id,
            PhotoRef {
                url: "https://blob/bill-of-lading.jpg".to_string(),
                category: PhotoCategory::Document,
                uploaded_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    h.controller
        .complete_stop(route.id, stops[1], with_checklist(driver.id))
        .await
        .unwrap();
    let after_pickup = h.job(job.id).await;
    assert_eq!(after_pickup.status, TransportJobStatus::InTransit);
    let pickup_photos = after_pickup.photos(JobLeg::Pickup);
    assert_eq!(pickup_photos.len(), 1);
    assert_eq!(pickup_photos[0].url, "https://blob/pickup-front.jpg");
    assert!(after_pickup.photos(JobLeg::Drop).is_empty());
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::InTransit);

    h.controller
        .complete_stop(route.id, stops[2], with_checklist(driver.id))
        .await
        .unwrap();
    assert_eq!(h.job(job.id).await.status, TransportJobStatus::Delivered);
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Delivered);

    h.controller
        .complete_stop(route.id, stops[3], TransitionContext::for_driver(driver.id))
        .await
        .unwrap();

    let completion = h.controller.complete_route(route.id, driver.id).await.unwrap();
    assert_eq!(completion.route.status, RouteStatus::Completed);
    assert_eq!(completion.route.state, None);
    assert!(completion.route.stops.iter().all(|s| s.status == StopStatus::Completed));

    let statistics = completion.statistics.unwrap();
    assert_eq!(statistics.stops_completed, 4);
    assert_eq!(statistics.photos_uploaded, 2);

    assert_eq!(h.store.find_driver(driver.id).await.unwrap().unwrap().current_route_id, None);
    assert_eq!(h.store.find_truck(truck.id).await.unwrap().unwrap().status, TruckStatus::Available);

    let tracking = h.store.find_tracking_record(route.id).await.unwrap().unwrap();
    assert_eq!(tracking.status, TrackingStatus::Completed);
    assert_eq!(tracking.action_history.first().map(|a| a.kind), Some(ActionKind::StartRoute));
    assert_eq!(tracking.action_history.last().map(|a| a.kind), Some(ActionKind::CompleteRoute));
    assert_eq!(h.audit.entries().await.len(), tracking.action_history.len());
}

#[tokio::test]
async fn test_skipped_pickup_cancels_job_without_reverting_delivered_vehicle() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;

    // jobA ya entregado en otra ruta
    let mut job_a = TransportJob::new(vehicle.id, None, None);
    job_a.status = TransportJobStatus::Delivered;
    h.store.insert_transport_job(job_a).await;
    h.controller.recompute_vehicle(vehicle.id).await.unwrap();
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Delivered);

    let (route, job_b) = h.single_job_route(&driver, &truck, &vehicle).await;
    let pickup_id = route.stops[1].id;

    h.controller.start_route(route.id, driver.id).await.unwrap();
    h.controller
        .complete_stop(route.id, route.stops[0].id, TransitionContext::for_driver(driver.id))
        .await
        .unwrap();
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Delivered);

    // sin motivo no se salta nada
    let err = h
        .controller
        .skip_stop(route.id, pickup_id, skip_because(driver.id, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingReason));
    assert_eq!(h.route(route.id).await.stops[1].status, StopStatus::InProgress);

    let outcome = h
        .controller
        .skip_stop(route.id, pickup_id, skip_because(driver.id, "customer cancelled"))
        .await
        .unwrap();
    assert_eq!(outcome.to, StopStatus::Skipped);

    let stored = h.route(route.id).await;
    assert_eq!(stored.stops[1].skip_reason.as_deref(), Some("customer cancelled"));
    assert_eq!(stored.stops[2].status, StopStatus::InProgress);

    assert_eq!(h.job(job_b.id).await.status, TransportJobStatus::Cancelled);
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Delivered);
}

#[tokio::test]
async fn test_driver_cannot_start_second_route() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route_a, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    let (route_b, _) = h.single_job_route(&driver, &truck, &vehicle).await;

    h.controller.start_route(route_a.id, driver.id).await.unwrap();
    let err = h.controller.start_route(route_b.id, driver.id).await.unwrap_err();
    match err {
        AppError::DriverHasOtherActiveRoute { active_route_id } => assert_eq!(active_route_id, route_a.id),
        other => panic!("unexpected error: {:?}", other),
    }

    let untouched = h.route(route_b.id).await;
    assert_eq!(untouched.status, RouteStatus::Planned);
    assert!(untouched.stops.iter().all(|s| s.status == StopStatus::Pending));

    // tras completar A, B puede arrancar
    h.controller.complete_route(route_a.id, driver.id).await.unwrap();
    h.controller.start_route(route_b.id, driver.id).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_starts_leave_one_active_route_per_driver() {
    let h = Harness::with_geocoder(Arc::new(DelayedGeocoder));
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route_a, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    let (route_b, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    for route_id in [route_a.id, route_b.id] {
        let mut route = h.route(route_id).await;
        route.stops[1].address = Some("Place Bellecour, Lyon".to_string());
        h.store.save_route(&route).await.unwrap();
    }

    let (a, b) = tokio::join!(
        h.controller.start_route(route_a.id, driver.id),
        h.controller.start_route(route_b.id, driver.id),
    );
    assert_ne!(a.is_ok(), b.is_ok(), "exactly one start must win");

    let (winner, loser, err) = match (a, b) {
        (Ok(_), Err(e)) => (route_a.id, route_b.id, e),
        (Err(e), Ok(_)) => (route_b.id, route_a.id, e),
        _ => unreachable!(),
    };
    match err {
        AppError::DriverHasOtherActiveRoute { active_route_id } => assert_eq!(active_route_id, winner),
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(h.route(winner).await.status, RouteStatus::InProgress);
    assert_eq!(h.route(loser).await.status, RouteStatus::Planned);
    let stored_driver = h.store.find_driver(driver.id).await.unwrap().unwrap();
    assert_eq!(stored_driver.current_route_id, Some(winner));

    // el tracking del ganador sigue aceptando pings
    h.controller
        .record_location(winner, driver.id, ping(45.76, 4.83))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_route_state_machine_and_invariant() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    assert!(h.route(route.id).await.state_is_consistent());

    let err = h.controller.stop_route(route.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let other_driver = Uuid::new_v4();
    let err = h.controller.start_route(route.id, other_driver).await.unwrap_err();
    assert!(matches!(err, AppError::NotOwnedByDriver));

    h.controller.start_route(route.id, driver.id).await.unwrap();
    assert!(h.route(route.id).await.state_is_consistent());

    let err = h.controller.start_route(route.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyInTargetState(_)));

    let err = h.controller.resume_route(route.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let stopped = h.controller.stop_route(route.id, driver.id).await.unwrap();
    assert_eq!(stopped.state, Some(RouteState::Stopped));
    let err = h.controller.stop_route(route.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyInTargetState(_)));

    let resumed = h.controller.resume_route(route.id, driver.id).await.unwrap();
    assert_eq!(resumed.state, Some(RouteState::Resumed));
    assert!(resumed.state_is_consistent());

    let completion = h.controller.complete_route(route.id, driver.id).await.unwrap();
    assert!(completion.route.state_is_consistent());

    let err = h.controller.complete_route(route.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyInTargetState(_)));

    let err = h.controller.start_route(Uuid::new_v4(), driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::RouteNotFound(_)));
}

#[tokio::test]
async fn test_location_pings_are_appended_and_frozen_after_completion() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    h.controller.start_route(route.id, driver.id).await.unwrap();

    let point = ping(48.8566, 2.3522);
    h.controller.record_location(route.id, driver.id, point.clone()).await.unwrap();
    h.controller.record_location(route.id, driver.id, point.clone()).await.unwrap();
    h.controller
        .record_location(route.id, driver.id, ping(48.8606, 2.3376))
        .await
        .unwrap();

    let tracking = h.controller.get_tracking(route.id).await.unwrap();
    assert_eq!(tracking.location_history.len(), 3);
    assert_eq!(tracking.location_history[0], tracking.location_history[1]);

    let completion = h.controller.complete_route(route.id, driver.id).await.unwrap();
    let statistics = completion.statistics.unwrap();
    assert_eq!(statistics.location_points, 3);
    assert!(statistics.total_distance_km > 1.0);

    let err = h
        .controller
        .record_location(route.id, driver.id, ping(48.87, 2.34))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TrackingNotActive(_)));

    let frozen = h.store.find_tracking_record(route.id).await.unwrap().unwrap();
    assert_eq!(frozen.location_history.len(), 3);
}

#[tokio::test]
async fn test_concurrent_pings_on_one_route_are_all_recorded() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    h.controller.start_route(route.id, driver.id).await.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let controller = h.controller.clone();
            let (route_id, driver_id) = (route.id, driver.id);
            tokio::spawn(async move {
                controller
                    .record_location(route_id, driver_id, ping(48.85 + i as f64 * 0.001, 2.35))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = h.store.find_tracking_record(route.id).await.unwrap().unwrap();
    assert_eq!(stored.location_history.len(), 10);
}

#[tokio::test]
async fn test_vehicle_outage_leaves_stop_and_job_updated() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, job) = h.single_job_route(&driver, &truck, &vehicle).await;

    h.controller.start_route(route.id, driver.id).await.unwrap();
    h.controller
        .complete_stop(route.id, route.stops[0].id, TransitionContext::for_driver(driver.id))
        .await
        .unwrap();

    h.store.set_unavailable(StoreCollection::Vehicles, true).await;
    let outcome = h
        .controller
        .complete_stop(route.id, route.stops[1].id, with_checklist(driver.id))
        .await
        .unwrap();
    assert_eq!(outcome.to, StopStatus::Completed);
    assert_eq!(outcome.propagation[0].job_status, TransportJobStatus::InTransit);
    assert_eq!(outcome.propagation[0].vehicle_status, None);
    assert_eq!(h.job(job.id).await.status, TransportJobStatus::InTransit);

    // el recalculo administrativo corrige el estado desactualizado
    h.store.set_unavailable(StoreCollection::Vehicles, false).await;
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::Dispatched);
    h.controller.recompute_transport_job(job.id).await.unwrap();
    assert_eq!(h.vehicle_status(vehicle.id).await, VehicleStatus::InTransit);
}

#[tokio::test]
async fn test_pickup_requires_checklist() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, job) = h.single_job_route(&driver, &truck, &vehicle).await;

    h.controller.start_route(route.id, driver.id).await.unwrap();
    h.controller
        .complete_stop(route.id, route.stops[0].id, TransitionContext::for_driver(driver.id))
        .await
        .unwrap();

    let err = h
        .controller
        .complete_stop(route.id, route.stops[1].id, TransitionContext::for_driver(driver.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingChecklist));
    assert_eq!(h.route(route.id).await.stops[1].status, StopStatus::InProgress);
    assert_eq!(h.job(job.id).await.status, TransportJobStatus::Dispatched);
}

#[tokio::test]
async fn test_removing_photo_after_completion_overwrites_job_photos() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, job) = h.single_job_route(&driver, &truck, &vehicle).await;
    let pickup_id = route.stops[1].id;

    h.controller.start_route(route.id, driver.id).await.unwrap();
    h.controller
        .complete_stop(route.id, route.stops[0].id, TransitionContext::for_driver(driver.id))
        .await
        .unwrap();
    for url in ["https://blob/a.jpg", "https://blob/b.jpg"] {
        h.controller
            .attach_photo(route.id, pickup_id, driver.id, vehicle_photo(url))
            .await
            .unwrap();
    }
    h.controller
        .complete_stop(route.id, pickup_id, with_checklist(driver.id))
        .await
        .unwrap();
    assert_eq!(h.job(job.id).await.pickup_photos.len(), 2);

    let stop = h
        .controller
        .remove_photo(route.id, pickup_id, driver.id, "https://blob/a.jpg")
        .await
        .unwrap();
    assert_eq!(stop.photos.len(), 1);
    let photos = h.job(job.id).await.pickup_photos;
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].url, "https://blob/b.jpg");

    let err = h
        .controller
        .remove_photo(route.id, pickup_id, driver.id, "https://blob/missing.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_free_actions_are_audited() {
    let h = Harness::new();
    let (driver, truck) = h.driver_and_truck().await;
    let vehicle = h.vehicle().await;
    let (route, _) = h.single_job_route(&driver, &truck, &vehicle).await;
    h.controller.start_route(route.id, driver.id).await.unwrap();

    let entry = h
        .controller
        .record_action(route.id, driver.id, ActionKind::Fuel, None, json!({ "liters": 180 }))
        .await
        .unwrap();

    let audit = h.audit.entries().await;
    let logged = audit.iter().find(|e| Some(e.id) == entry.audit_log_id).unwrap();
    assert_eq!(logged.action, "fuel");
    assert_eq!(logged.actor_id, Some(driver.id));
    assert_eq!(logged.entity_id, route.id);
}
