//! Store en memoria
//!
//! Implementación de `TransportStore` para desarrollo local sin PostgreSQL
//! y para tests. Permite simular caídas por colección.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::transport_store::TransportStore;
use crate::models::{
    ActionEntry, Driver, JobLeg, LocationPoint, PhotoRef, Route, Stop, TrackingRecord,
    TransportJob, TransportJobStatus, Truck, TruckStatus, Vehicle, VehicleStatus,
};
use crate::utils::errors::{AppError, AppResult};

/// Colecciones que se pueden marcar como no disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCollection {
    Routes,
    TransportJobs,
    Vehicles,
    Drivers,
    Trucks,
    Tracking,
}

#[derive(Default)]
pub struct InMemoryStore {
    routes: RwLock<HashMap<Uuid, Route>>,
    transport_jobs: RwLock<HashMap<Uuid, TransportJob>>,
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
    drivers: RwLock<HashMap<Uuid, Driver>>,
    trucks: RwLock<HashMap<Uuid, Truck>>,
    // clave: route_id
    tracking: RwLock<HashMap<Uuid, TrackingRecord>>,
    unavailable: RwLock<HashSet<StoreCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simular (o terminar) una caída de una colección
    pub async fn set_unavailable(&self, collection: StoreCollection, unavailable: bool) {
        let mut set = self.unavailable.write().await;
        if unavailable {
            set.insert(collection);
        } else {
            set.remove(&collection);
        }
    }

    async fn check(&self, collection: StoreCollection) -> AppResult<()> {
        if self.unavailable.read().await.contains(&collection) {
            return Err(AppError::ServiceUnavailable(format!("{:?} store unavailable", collection)));
        }
        Ok(())
    }

    pub async fn insert_route(&self, route: Route) {
        self.routes.write().await.insert(route.id, route);
    }

    pub async fn insert_transport_job(&self, job: TransportJob) {
        self.transport_jobs.write().await.insert(job.id, job);
    }

    pub async fn insert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().await.insert(vehicle.id, vehicle);
    }

    pub async fn insert_driver(&self, driver: Driver) {
        self.drivers.write().await.insert(driver.id, driver);
    }

    pub async fn insert_truck(&self, truck: Truck) {
        self.trucks.write().await.insert(truck.id, truck);
    }
}

#[async_trait]
impl TransportStore for InMemoryStore {
    async fn find_route(&self, id: Uuid) -> AppResult<Option<Route>> {
        self.check(StoreCollection::Routes).await?;
        Ok(self.routes.read().await.get(&id).cloned())
    }

    async fn save_route(&self, route: &Route) -> AppResult<()> {
        self.check(StoreCollection::Routes).await?;
        let mut stored = route.clone();
        stored.updated_at = Utc::now();
        self.routes.write().await.insert(route.id, stored);
        Ok(())
    }

    async fn update_stop(&self, route_id: Uuid, stop: &Stop) -> AppResult<()> {
        self.check(StoreCollection::Routes).await?;
        let mut routes = self.routes.write().await;
        let route = routes.get_mut(&route_id).ok_or(AppError::RouteNotFound(route_id))?;
        let slot = route
            .stops
            .iter_mut()
            .find(|s| s.id == stop.id)
            .ok_or(AppError::StopNotFound(stop.id))?;
        *slot = stop.clone();
        route.updated_at = Utc::now();
        Ok(())
    }

    async fn find_transport_job(&self, id: Uuid) -> AppResult<Option<TransportJob>> {
        self.check(StoreCollection::TransportJobs).await?;
        Ok(self.transport_jobs.read().await.get(&id).cloned())
    }

    async fn find_transport_jobs_by_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vec<TransportJob>> {
        self.check(StoreCollection::TransportJobs).await?;
        let mut jobs: Vec<TransportJob> = self
            .transport_jobs
            .read()
            .await
            .values()
            .filter(|j| j.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn compare_and_set_transport_job_status(
        &self,
        id: Uuid,
        expected: TransportJobStatus,
        status: TransportJobStatus,
    ) -> AppResult<bool> {
        self.check(StoreCollection::TransportJobs).await?;
        let mut jobs = self.transport_jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("transport job '{}'", id)))?;
        if job.status != expected {
            return Ok(false);
        }
        job.status = status;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn replace_transport_job_photos(&self, id: Uuid, leg: JobLeg, photos: &[PhotoRef]) -> AppResult<()> {
        self.check(StoreCollection::TransportJobs).await?;
        let mut jobs = self.transport_jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("transport job '{}'", id)))?;
        match leg {
            JobLeg::Pickup => job.pickup_photos = photos.to_vec(),
            JobLeg::Drop => job.drop_photos = photos.to_vec(),
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn find_vehicle(&self, id: Uuid) -> AppResult<Option<Vehicle>> {
        self.check(StoreCollection::Vehicles).await?;
        Ok(self.vehicles.read().await.get(&id).cloned())
    }

    async fn update_vehicle_status(&self, id: Uuid, status: VehicleStatus) -> AppResult<()> {
        self.check(StoreCollection::Vehicles).await?;
        let mut vehicles = self.vehicles.write().await;
        let vehicle = vehicles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("vehicle '{}'", id)))?;
        vehicle.status = status;
        vehicle.updated_at = Utc::now();
        Ok(())
    }

    async fn find_driver(&self, id: Uuid) -> AppResult<Option<Driver>> {
        self.check(StoreCollection::Drivers).await?;
        Ok(self.drivers.read().await.get(&id).cloned())
    }

    async fn claim_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()> {
        self.check(StoreCollection::Drivers).await?;
        let mut drivers = self.drivers.write().await;
        let driver = drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver '{}'", driver_id)))?;
        match driver.current_route_id {
            Some(active_route_id) if active_route_id != route_id => {
                Err(AppError::DriverHasOtherActiveRoute { active_route_id })
            }
            _ => {
                driver.current_route_id = Some(route_id);
                Ok(())
            }
        }
    }

    async fn release_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()> {
        self.check(StoreCollection::Drivers).await?;
        let mut drivers = self.drivers.write().await;
        let driver = drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver '{}'", driver_id)))?;
        if driver.current_route_id == Some(route_id) {
            driver.current_route_id = None;
        }
        Ok(())
    }

    async fn find_truck(&self, id: Uuid) -> AppResult<Option<Truck>> {
        self.check(StoreCollection::Trucks).await?;
        Ok(self.trucks.read().await.get(&id).cloned())
    }

    async fn update_truck_status(&self, id: Uuid, status: TruckStatus) -> AppResult<()> {
        self.check(StoreCollection::Trucks).await?;
        let mut trucks = self.trucks.write().await;
        let truck = trucks
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("truck '{}'", id)))?;
        truck.status = status;
        Ok(())
    }

    async fn find_tracking_record(&self, route_id: Uuid) -> AppResult<Option<TrackingRecord>> {
        self.check(StoreCollection::Tracking).await?;
        Ok(self.tracking.read().await.get(&route_id).cloned())
    }

    async fn insert_tracking_record(&self, record: &TrackingRecord) -> AppResult<()> {
        self.check(StoreCollection::Tracking).await?;
        let mut tracking = self.tracking.write().await;
        if tracking.contains_key(&record.route_id) {
            return Err(AppError::InvalidTransition(format!(
                "tracking record already exists for route '{}'",
                record.route_id
            )));
        }
        tracking.insert(record.route_id, record.clone());
        Ok(())
    }

    async fn append_tracking_location(&self, tracking_id: Uuid, point: &LocationPoint) -> AppResult<()> {
        self.check(StoreCollection::Tracking).await?;
        let mut tracking = self.tracking.write().await;
        let record = tracking
            .values_mut()
            .find(|r| r.id == tracking_id)
            .ok_or_else(|| AppError::NotFound(format!("tracking record '{}'", tracking_id)))?;
        record.location_history.push(point.clone());
        Ok(())
    }

    async fn append_tracking_action(&self, tracking_id: Uuid, action: &ActionEntry) -> AppResult<()> {
        self.check(StoreCollection::Tracking).await?;
        let mut tracking = self.tracking.write().await;
        let record = tracking
            .values_mut()
            .find(|r| r.id == tracking_id)
            .ok_or_else(|| AppError::NotFound(format!("tracking record '{}'", tracking_id)))?;
        record.action_history.push(action.clone());
        Ok(())
    }

    async fn update_tracking_summary(&self, record: &TrackingRecord) -> AppResult<()> {
        self.check(StoreCollection::Tracking).await?;
        let mut tracking = self.tracking.write().await;
        let stored = tracking
            .get_mut(&record.route_id)
            .ok_or_else(|| AppError::NotFound(format!("tracking record '{}'", record.id)))?;
        stored.status = record.status;
        stored.completed_at = record.completed_at;
        stored.statistics = record.statistics.clone();
        Ok(())
    }
}
