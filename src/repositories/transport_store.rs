//! Contrato de persistencia
//!
//! Todo acceso a Route, TransportJob, Vehicle, Driver, Truck y TrackingRecord
//! pasa por este trait. Las referencias entre entidades son siempre `Uuid`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ActionEntry, Driver, JobLeg, LocationPoint, PhotoRef, Route, Stop, TrackingRecord,
    TransportJob, TransportJobStatus, Truck, TruckStatus, Vehicle, VehicleStatus,
};
use crate::utils::errors::AppResult;

#[async_trait]
pub trait TransportStore: Send + Sync {
    // Rutas
    async fn find_route(&self, id: Uuid) -> AppResult<Option<Route>>;
    /// Escritura atómica del documento completo (ruta + paradas)
    async fn save_route(&self, route: &Route) -> AppResult<()>;
    /// Actualiza una parada embebida por (RouteId, StopId)
    async fn update_stop(&self, route_id: Uuid, stop: &Stop) -> AppResult<()>;

    // Transport jobs
    async fn find_transport_job(&self, id: Uuid) -> AppResult<Option<TransportJob>>;
    async fn find_transport_jobs_by_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vec<TransportJob>>;
    /// Escribe `status` solo si el job sigue en `expected`; `false` si otro
    /// escritor lo cambió entre la lectura y la escritura
    async fn compare_and_set_transport_job_status(
        &self,
        id: Uuid,
        expected: TransportJobStatus,
        status: TransportJobStatus,
    ) -> AppResult<bool>;
    /// Reemplaza por completo la lista de fotos del tramo
    async fn replace_transport_job_photos(&self, id: Uuid, leg: JobLeg, photos: &[PhotoRef]) -> AppResult<()>;

    // Vehículos
    async fn find_vehicle(&self, id: Uuid) -> AppResult<Option<Vehicle>>;
    async fn update_vehicle_status(&self, id: Uuid, status: VehicleStatus) -> AppResult<()>;

    // Flota
    async fn find_driver(&self, id: Uuid) -> AppResult<Option<Driver>>;
    /// Asigna la ruta actual si el conductor está libre o ya la tiene.
    /// Falla con `DriverHasOtherActiveRoute` si tiene otra.
    async fn claim_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()>;
    /// Libera al conductor solo si su ruta actual es `route_id`
    async fn release_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()>;
    async fn find_truck(&self, id: Uuid) -> AppResult<Option<Truck>>;
    async fn update_truck_status(&self, id: Uuid, status: TruckStatus) -> AppResult<()>;

    // Tracking
    async fn find_tracking_record(&self, route_id: Uuid) -> AppResult<Option<TrackingRecord>>;
    async fn insert_tracking_record(&self, record: &TrackingRecord) -> AppResult<()>;
    async fn append_tracking_location(&self, tracking_id: Uuid, point: &LocationPoint) -> AppResult<()>;
    async fn append_tracking_action(&self, tracking_id: Uuid, action: &ActionEntry) -> AppResult<()>;
    /// Solo estado, fecha de cierre y estadísticas; el historial no se toca
    async fn update_tracking_summary(&self, record: &TrackingRecord) -> AppResult<()>;
}
