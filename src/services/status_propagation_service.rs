//! Servicio de propagación de estados
//!
//! Recalcula el estado de un TransportJob a partir de sus paradas pickup y
//! drop (que pueden estar en rutas distintas) y después el estado del
//! Vehicle a partir de todos sus jobs.
//!
//! El recálculo es una función pura del estado actual de las paradas: se
//! puede repetir cuantas veces haga falta con el mismo resultado. Un fallo a
//! mitad de cascada no deshace la transición de la parada; el estado queda
//! desactualizado hasta el próximo recálculo.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    JobLeg, PhotoRef, Route, StopStatus, StopType, TransportJob, TransportJobStatus,
    VehicleStatus,
};
use crate::repositories::TransportStore;
use crate::utils::errors::{AppError, AppResult};

/// Precedencia para el estado agregado del vehículo: gana el rango más alto.
/// La cancelación tiene el rango más bajo, así que un job cancelado nunca
/// hace retroceder un vehículo que otro job ya entregó o tiene en tránsito.
pub const VEHICLE_STATUS_PRECEDENCE: [(TransportJobStatus, u8); 5] = [
    (TransportJobStatus::Cancelled, 0),
    (TransportJobStatus::NeedsDispatch, 1),
    (TransportJobStatus::Dispatched, 2),
    (TransportJobStatus::InTransit, 3),
    (TransportJobStatus::Delivered, 4),
];

/// Reintentos del recálculo de un job cuando otro escritor se adelanta
const MAX_JOB_STATUS_ATTEMPTS: usize = 3;

pub fn precedence(status: TransportJobStatus) -> u8 {
    VEHICLE_STATUS_PRECEDENCE
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, rank)| *rank)
        .unwrap_or(0)
}

/// Estado del job según sus dos paradas (`None` = parada no encontrada)
pub fn derive_transport_job_status(
    pickup: Option<StopStatus>,
    drop: Option<StopStatus>,
) -> TransportJobStatus {
    if pickup == Some(StopStatus::Skipped) || drop == Some(StopStatus::Skipped) {
        return TransportJobStatus::Cancelled;
    }
    if drop == Some(StopStatus::Completed) {
        return TransportJobStatus::Delivered;
    }
    match pickup {
        Some(StopStatus::Completed) => TransportJobStatus::InTransit,
        Some(StopStatus::InProgress) => TransportJobStatus::Dispatched,
        _ => TransportJobStatus::NeedsDispatch,
    }
}

/// Estado agregado del vehículo; `None` si no tiene jobs
pub fn derive_vehicle_status<I>(job_statuses: I) -> Option<VehicleStatus>
where
    I: IntoIterator<Item = TransportJobStatus>,
{
    job_statuses
        .into_iter()
        .max_by_key(|s| precedence(*s))
        .map(VehicleStatus::from)
}

/// Resultado de una propagación
#[derive(Debug, Clone, serde::Serialize)]
pub struct PropagationOutcome {
    pub transport_job_id: Uuid,
    pub job_status: TransportJobStatus,
    pub vehicle_id: Uuid,
    /// `None` si el vehículo no se pudo recalcular (queda desactualizado)
    pub vehicle_status: Option<VehicleStatus>,
}

#[derive(Clone)]
pub struct StatusPropagationService {
    store: Arc<dyn TransportStore>,
}

impl StatusPropagationService {
    pub fn new(store: Arc<dyn TransportStore>) -> Self {
        Self { store }
    }

    /// Punto de entrada tras cada transición de una parada pickup/drop
    pub async fn on_stop_transition(
        &self,
        route_id: Uuid,
        stop_index: usize,
        new_status: StopStatus,
        stop_type: StopType,
        transport_job_id: Uuid,
    ) -> AppResult<PropagationOutcome> {
        debug!(
            "🔄 Propagando parada #{} ({} -> {}) de ruta {} al job {}",
            stop_index,
            stop_type.as_str(),
            new_status.as_str(),
            route_id,
            transport_job_id
        );

        let job = self.recompute_transport_job(transport_job_id).await?;

        let vehicle_status = match self.recompute_vehicle(job.vehicle_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "⚠️ Estado del vehículo {} queda desactualizado tras job {}: {}",
                    job.vehicle_id, job.id, e
                );
                None
            }
        };

        Ok(PropagationOutcome {
            transport_job_id: job.id,
            job_status: job.status,
            vehicle_id: job.vehicle_id,
            vehicle_status,
        })
    }

    /// Recalcula y persiste el estado del job; devuelve el job actualizado.
    ///
    /// El job se lee antes que las rutas y la escritura es condicional al
    /// estado leído: si otro recálculo escribió entre medias, se vuelve a
    /// derivar con rutas frescas en lugar de pisar un estado más nuevo.
    pub async fn recompute_transport_job(&self, transport_job_id: Uuid) -> AppResult<TransportJob> {
        for attempt in 1..=MAX_JOB_STATUS_ATTEMPTS {
            let mut job = self
                .store
                .find_transport_job(transport_job_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("transport job '{}'", transport_job_id)))?;

            let status = self.derive_job_status(&job).await?;
            if status == job.status {
                return Ok(job);
            }

            if self
                .store
                .compare_and_set_transport_job_status(job.id, job.status, status)
                .await?
            {
                info!("📦 Job {}: {} -> {}", job.id, job.status.label(), status.label());
                job.status = status;
                return Ok(job);
            }
            debug!("🔁 Job {} cambió durante el recálculo (intento {})", job.id, attempt);
        }

        warn!(
            "⚠️ Job {} sigue cambiando tras {} intentos, queda para el próximo recálculo",
            transport_job_id, MAX_JOB_STATUS_ATTEMPTS
        );
        Err(AppError::ServiceUnavailable(format!(
            "transport job '{}' kept changing during recompute",
            transport_job_id
        )))
    }

    async fn derive_job_status(&self, job: &TransportJob) -> AppResult<TransportJobStatus> {
        let (pickup_route, drop_route) = if job.pickup_route_id.is_some() && job.pickup_route_id == job.drop_route_id {
            let route = self.load_route(job.pickup_route_id).await?;
            (route.clone(), route)
        } else {
            futures::future::try_join(
                self.load_route(job.pickup_route_id),
                self.load_route(job.drop_route_id),
            )
            .await?
        };

        let pickup = pickup_route
            .as_ref()
            .and_then(|r| r.job_stop(job.id, StopType::Pickup))
            .map(|s| s.status);
        let drop = drop_route
            .as_ref()
            .and_then(|r| r.job_stop(job.id, StopType::Drop))
            .map(|s| s.status);

        Ok(derive_transport_job_status(pickup, drop))
    }

    /// Recalcula y persiste el estado del vehículo a partir de todos sus jobs
    pub async fn recompute_vehicle(&self, vehicle_id: Uuid) -> AppResult<Option<VehicleStatus>> {
        let vehicle = self
            .store
            .find_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle '{}'", vehicle_id)))?;

        let jobs = self.store.find_transport_jobs_by_vehicle(vehicle_id).await?;
        let Some(status) = derive_vehicle_status(jobs.iter().map(|j| j.status)) else {
            debug!("Vehículo {} sin jobs, estado sin cambios", vehicle_id);
            return Ok(Some(vehicle.status));
        };

        if status != vehicle.status {
            self.store.update_vehicle_status(vehicle_id, status).await?;
            info!("🚗 Vehículo {}: {:?} -> {:?}", vehicle_id, vehicle.status, status);
        }

        Ok(Some(status))
    }

    /// Copia las fotos de vehículo de la parada al tramo del job (sobrescribe)
    pub async fn mirror_leg_photos(
        &self,
        transport_job_id: Uuid,
        leg: JobLeg,
        photos: &[PhotoRef],
    ) -> AppResult<()> {
        self.store
            .replace_transport_job_photos(transport_job_id, leg, photos)
            .await?;
        debug!(
            "📸 {} fotos reflejadas en job {} ({:?})",
            photos.len(),
            transport_job_id,
            leg
        );
        Ok(())
    }

    async fn load_route(&self, route_id: Option<Uuid>) -> AppResult<Option<Route>> {
        let Some(route_id) = route_id else {
            return Ok(None);
        };
        let route = self.store.find_route(route_id).await?;
        if route.is_none() {
            warn!("⚠️ Ruta {} referenciada por un job no existe", route_id);
        }
        Ok(route)
    }
}
