//! Controlador del ciclo de vida de rutas
//!
//! Punto de entrada de todas las acciones del conductor. La escritura de la
//! ruta es la operación autoritativa: si falla, la acción falla. Todo lo que
//! viene después (conductor, camión, jobs, vehículos, ledger) se registra en
//! logs si falla y no deshace la escritura.
//!
//! Las acciones sobre una misma ruta se serializan con un lock por ruta.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::models::{
    ActionEntry, ActionKind, Coordinates, JobLeg, LocationPoint, PhotoRef, Route, RouteState, RouteStatus,
    Stop, StopStatus, StopType, TrackingRecord, TrackingStatistics, TransportJob, TruckStatus,
    VehicleStatus,
};
use crate::repositories::TransportStore;
use crate::services::stop_state_machine::{self, StopTransition, TransitionContext};
use crate::services::tracking_ledger_service::stop_details;
use crate::services::{
    GeocodingProvider, PropagationOutcome, StatusPropagationService, TrackingLedgerService,
};
use crate::utils::errors::{AppError, AppResult};
use crate::utils::geo::is_valid_coordinate;
use crate::utils::keyed_lock::KeyedLocks;

/// Ajustes operativos del controlador
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Rechazar `complete_route` mientras queden paradas sin resolver
    pub require_resolved_stops: bool,
    /// Tiempo máximo del geocoding de paradas al arrancar
    pub geocoding_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            require_resolved_stops: false,
            geocoding_timeout: Duration::from_secs(5),
        }
    }
}

/// Resultado de una acción sobre una parada
#[derive(Debug, Clone, Serialize)]
pub struct StopActionOutcome {
    pub route: Route,
    pub stop_id: Uuid,
    pub from: StopStatus,
    pub to: StopStatus,
    pub promoted_stop_id: Option<Uuid>,
    /// Estados derivados; vacío si la propagación falló o no aplica
    pub propagation: Vec<PropagationOutcome>,
}

/// Resultado de completar una ruta
#[derive(Debug, Clone, Serialize)]
pub struct RouteCompletion {
    pub route: Route,
    /// `None` si el ledger no se pudo finalizar
    pub statistics: Option<TrackingStatistics>,
}

pub struct RouteLifecycleController {
    store: Arc<dyn TransportStore>,
    propagation: StatusPropagationService,
    ledger: TrackingLedgerService,
    geocoder: Arc<dyn GeocodingProvider>,
    route_locks: KeyedLocks,
    settings: LifecycleSettings,
}

impl RouteLifecycleController {
    pub fn new(
        store: Arc<dyn TransportStore>,
        ledger: TrackingLedgerService,
        geocoder: Arc<dyn GeocodingProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            propagation: StatusPropagationService::new(store.clone()),
            store,
            ledger,
            geocoder,
            route_locks: KeyedLocks::new(),
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Ciclo de vida de la ruta
    // ------------------------------------------------------------------

    /// Planned -> InProgress/Started
    pub async fn start_route(&self, route_id: Uuid, driver_id: Uuid) -> AppResult<Route> {
        let _guard = self.route_locks.acquire(route_id).await;
        let mut route = self.load_owned_route(route_id, driver_id).await?;

        match route.status {
            RouteStatus::Planned => {}
            RouteStatus::InProgress => {
                return Err(AppError::AlreadyInTargetState("in_progress".to_string()))
            }
            RouteStatus::Completed => {
                return Err(AppError::InvalidTransition("route is already completed".to_string()))
            }
        }

        // El lock es por ruta: la exclusión entre rutas del mismo conductor
        // la da el claim condicional del store, antes de cualquier await largo
        self.store.claim_driver_route(driver_id, route_id).await?;

        self.backfill_coordinates(&mut route).await;

        let now = Utc::now();
        route.status = RouteStatus::InProgress;
        route.state = Some(RouteState::Started);
        route.actual_start = Some(now);
        route.updated_at = now;
        let promoted = stop_state_machine::promote_next(&mut route);

        if let Err(e) = self.store.save_route(&route).await {
            if let Err(release_err) = self.store.release_driver_route(driver_id, route_id).await {
                error!("❌ No se pudo liberar al conductor {}: {}", driver_id, release_err);
            }
            return Err(e);
        }
        info!("🚚 Ruta {} iniciada por conductor {}", route_id, driver_id);

        self.set_truck_status(route.truck_id, TruckStatus::InUse).await;

        if let Some(promotion) = promoted {
            self.propagate_stop(&route, promotion.stop_index).await;
        }

        if let Err(e) = self.ledger.start_tracking(&route).await {
            error!("❌ No se pudo iniciar el tracking de la ruta {}: {}", route_id, e);
        }
        self.log_action(
            route_id,
            ActionKind::StartRoute,
            json!({ "truck_id": route.truck_id, "stops": route.stops.len() }),
        )
        .await;

        Ok(route)
    }

    /// Started|Resumed -> Stopped
    pub async fn stop_route(&self, route_id: Uuid, driver_id: Uuid) -> AppResult<Route> {
        self.change_state(route_id, driver_id, RouteState::Stopped).await
    }

    /// Stopped -> Resumed
    pub async fn resume_route(&self, route_id: Uuid, driver_id: Uuid) -> AppResult<Route> {
        self.change_state(route_id, driver_id, RouteState::Resumed).await
    }

    /// InProgress -> Completed
    pub async fn complete_route(&self, route_id: Uuid, driver_id: Uuid) -> AppResult<RouteCompletion> {
        let guard = self.route_locks.acquire(route_id).await;
        let mut route = self.load_owned_route(route_id, driver_id).await?;

        match route.status {
            RouteStatus::InProgress => {}
            RouteStatus::Completed => {
                return Err(AppError::AlreadyInTargetState("completed".to_string()))
            }
            RouteStatus::Planned => {
                return Err(AppError::InvalidTransition("route has not been started".to_string()))
            }
        }

        let unresolved = route.unresolved_stops();
        if self.settings.require_resolved_stops && unresolved > 0 {
            return Err(AppError::UnresolvedStops(unresolved));
        }
        if unresolved > 0 {
            warn!("⚠️ Ruta {} completada con {} paradas sin resolver", route_id, unresolved);
        }

        let now = Utc::now();
        route.status = RouteStatus::Completed;
        route.state = None;
        route.actual_end = Some(now);
        route.updated_at = now;

        self.store.save_route(&route).await?;
        info!("✅ Ruta {} completada", route_id);

        if let Err(e) = self.store.release_driver_route(driver_id, route_id).await {
            error!("❌ No se pudo liberar al conductor {}: {}", driver_id, e);
        }
        self.set_truck_status(route.truck_id, TruckStatus::Available).await;

        self.log_action(
            route_id,
            ActionKind::CompleteRoute,
            json!({ "unresolved_stops": unresolved }),
        )
        .await;
        let statistics = match self.ledger.finalize(route_id).await {
            Ok(statistics) => Some(statistics),
            Err(e) => {
                error!("❌ No se pudo finalizar el tracking de la ruta {}: {}", route_id, e);
                None
            }
        };

        drop(guard);
        let pruned = self.route_locks.prune().await;
        if pruned > 0 {
            debug!("🧹 {} locks de ruta liberados", pruned);
        }

        Ok(RouteCompletion { route, statistics })
    }

    async fn change_state(&self, route_id: Uuid, driver_id: Uuid, target: RouteState) -> AppResult<Route> {
        let _guard = self.route_locks.acquire(route_id).await;
        let mut route = self.load_owned_route(route_id, driver_id).await?;

        if route.status != RouteStatus::InProgress {
            return Err(AppError::InvalidTransition("route is not in progress".to_string()));
        }

        let current = route.state;
        let allowed = match target {
            RouteState::Stopped => matches!(current, Some(RouteState::Started | RouteState::Resumed)),
            RouteState::Resumed => current == Some(RouteState::Stopped),
            RouteState::Started => false,
        };
        if current == Some(target) {
            return Err(AppError::AlreadyInTargetState(state_label(target).to_string()));
        }
        if !allowed {
            return Err(AppError::InvalidTransition(format!(
                "cannot move route from {} to {}",
                current.map(state_label).unwrap_or("none"),
                state_label(target)
            )));
        }

        route.state = Some(target);
        route.updated_at = Utc::now();
        self.store.save_route(&route).await?;
        info!("🔁 Ruta {}: {} -> {}", route_id, current.map(state_label).unwrap_or("none"), state_label(target));

        let kind = match target {
            RouteState::Stopped => ActionKind::StopRoute,
            _ => ActionKind::ResumeRoute,
        };
        self.log_action(route_id, kind, json!({})).await;

        Ok(route)
    }

    // ------------------------------------------------------------------
    // Paradas
    // ------------------------------------------------------------------

    /// Pending -> InProgress de la siguiente parada cuando ninguna está en curso
    pub async fn arrive_at_stop(&self, route_id: Uuid, stop_id: Uuid, driver_id: Uuid) -> AppResult<StopActionOutcome> {
        let ctx = TransitionContext::for_driver(driver_id);
        self.apply_stop_transition(route_id, stop_id, StopStatus::InProgress, ctx, ActionKind::ArriveStop)
            .await
    }

    pub async fn complete_stop(&self, route_id: Uuid, stop_id: Uuid, ctx: TransitionContext) -> AppResult<StopActionOutcome> {
        self.apply_stop_transition(route_id, stop_id, StopStatus::Completed, ctx, ActionKind::CompleteStop)
            .await
    }

    pub async fn skip_stop(&self, route_id: Uuid, stop_id: Uuid, ctx: TransitionContext) -> AppResult<StopActionOutcome> {
        self.apply_stop_transition(route_id, stop_id, StopStatus::Skipped, ctx, ActionKind::SkipStop)
            .await
    }

    async fn apply_stop_transition(
        &self,
        route_id: Uuid,
        stop_id: Uuid,
        requested: StopStatus,
        ctx: TransitionContext,
        kind: ActionKind,
    ) -> AppResult<StopActionOutcome> {
        let _guard = self.route_locks.acquire(route_id).await;
        let mut route = self
            .store
            .find_route(route_id)
            .await?
            .ok_or(AppError::RouteNotFound(route_id))?;

        let transition = stop_state_machine::transition(&mut route, stop_id, requested, &ctx)?;
        route.updated_at = Utc::now();

        // con promoción cambian dos paradas: se escribe el documento entero
        if transition.promoted.is_some() {
            self.store.save_route(&route).await?;
        } else {
            self.store
                .update_stop(route_id, &route.stops[transition.stop_index])
                .await?;
        }
        info!(
            "📍 Parada {} de ruta {}: {} -> {}",
            stop_id,
            route_id,
            transition.from.as_str(),
            transition.to.as_str()
        );

        let mut propagation = Vec::new();
        if transition.touches_transport_job() {
            propagation.extend(self.propagate_stop(&route, transition.stop_index).await);
        }
        if let Some(promotion) = transition.promoted {
            propagation.extend(self.propagate_stop(&route, promotion.stop_index).await);
        }

        let stop = &route.stops[transition.stop_index];
        self.log_action(route_id, kind, transition_details(&transition, stop)).await;

        Ok(StopActionOutcome {
            stop_id,
            from: transition.from,
            to: transition.to,
            promoted_stop_id: transition.promoted.map(|p| p.stop_id),
            propagation,
            route,
        })
    }

    /// Adjuntar una foto ya subida a la parada
    pub async fn attach_photo(
        &self,
        route_id: Uuid,
        stop_id: Uuid,
        driver_id: Uuid,
        photo: PhotoRef,
    ) -> AppResult<Stop> {
        let _guard = self.route_locks.acquire(route_id).await;
        let mut route = self.load_owned_route(route_id, driver_id).await?;
        let index = editable_stop_index(&route, stop_id)?;

        let stop = &mut route.stops[index];
        stop.photos.push(photo.clone());
        let stop = stop.clone();
        self.store.update_stop(route_id, &stop).await?;
        debug!("📸 Foto añadida a parada {} ({} en total)", stop_id, stop.photos.len());

        self.remirror_if_completed(&stop).await;
        self.log_action(
            route_id,
            ActionKind::UploadPhoto,
            stop_details(stop.id, stop.sequence, json!({ "url": photo.url, "category": photo.category })),
        )
        .await;

        Ok(stop)
    }

    /// Quitar una foto de la parada por URL
    pub async fn remove_photo(&self, route_id: Uuid, stop_id: Uuid, driver_id: Uuid, url: &str) -> AppResult<Stop> {
        let _guard = self.route_locks.acquire(route_id).await;
        let mut route = self.load_owned_route(route_id, driver_id).await?;
        let index = editable_stop_index(&route, stop_id)?;

        let stop = &mut route.stops[index];
        let before = stop.photos.len();
        stop.photos.retain(|p| p.url != url);
        if stop.photos.len() == before {
            return Err(AppError::NotFound(format!("photo '{}'", url)));
        }
        let stop = stop.clone();
        self.store.update_stop(route_id, &stop).await?;

        self.remirror_if_completed(&stop).await;
        self.log_action(
            route_id,
            ActionKind::RemovePhoto,
            stop_details(stop.id, stop.sequence, json!({ "url": url })),
        )
        .await;

        Ok(stop)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Ping de ubicación; aquí el ledger es la escritura autoritativa
    pub async fn record_location(&self, route_id: Uuid, driver_id: Uuid, point: LocationPoint) -> AppResult<LocationPoint> {
        if !is_valid_coordinate(point.latitude, point.longitude) {
            let mut errors = ValidationErrors::new();
            errors.add("location", ValidationError::new("coordinates_out_of_range"));
            return Err(errors.into());
        }
        let route = self.load_owned_route(route_id, driver_id).await?;
        if route.status != RouteStatus::InProgress {
            return Err(AppError::TrackingNotActive(route_id));
        }
        self.ledger.append_location(route_id, point).await
    }

    /// Acciones libres del conductor: pausa, combustible, notas
    pub async fn record_action(
        &self,
        route_id: Uuid,
        driver_id: Uuid,
        kind: ActionKind,
        location: Option<Coordinates>,
        details: serde_json::Value,
    ) -> AppResult<ActionEntry> {
        if !matches!(kind, ActionKind::Break | ActionKind::Fuel | ActionKind::Note) {
            return Err(AppError::InvalidTransition(format!(
                "action '{}' is recorded by its own operation",
                kind.as_str()
            )));
        }
        let route = self.load_owned_route(route_id, driver_id).await?;
        if route.status != RouteStatus::InProgress {
            return Err(AppError::TrackingNotActive(route_id));
        }
        self.ledger.append_action(route_id, kind, location, details).await
    }

    // ------------------------------------------------------------------
    // Consultas y administración
    // ------------------------------------------------------------------

    pub async fn get_route(&self, route_id: Uuid) -> AppResult<Route> {
        self.store
            .find_route(route_id)
            .await?
            .ok_or(AppError::RouteNotFound(route_id))
    }

    pub async fn get_tracking(&self, route_id: Uuid) -> AppResult<TrackingRecord> {
        self.ledger
            .current(route_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tracking for route '{}'", route_id)))
    }

    pub async fn recompute_transport_job(&self, transport_job_id: Uuid) -> AppResult<TransportJob> {
        let job = self.propagation.recompute_transport_job(transport_job_id).await?;
        if let Err(e) = self.propagation.recompute_vehicle(job.vehicle_id).await {
            warn!("⚠️ Recalculo del vehículo {} falló: {}", job.vehicle_id, e);
        }
        Ok(job)
    }

    pub async fn recompute_vehicle(&self, vehicle_id: Uuid) -> AppResult<Option<VehicleStatus>> {
        self.propagation.recompute_vehicle(vehicle_id).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_owned_route(&self, route_id: Uuid, driver_id: Uuid) -> AppResult<Route> {
        let route = self
            .store
            .find_route(route_id)
            .await?
            .ok_or(AppError::RouteNotFound(route_id))?;
        if route.driver_id != driver_id {
            return Err(AppError::NotOwnedByDriver);
        }
        Ok(route)
    }

    /// Efectos posteriores de una parada pickup/drop: fotos y estados
    async fn propagate_stop(&self, route: &Route, stop_index: usize) -> Option<PropagationOutcome> {
        let stop = &route.stops[stop_index];
        let transport_job_id = stop.transport_job_id?;
        if !stop.stop_type.is_job_leg() {
            return None;
        }

        if stop.status == StopStatus::Completed {
            if let Some(leg) = job_leg(stop.stop_type) {
                let photos = stop.vehicle_photos();
                if let Err(e) = self.propagation.mirror_leg_photos(transport_job_id, leg, &photos).await {
                    error!("❌ No se pudieron reflejar las fotos en el job {}: {}", transport_job_id, e);
                }
            }
        }

        match self
            .propagation
            .on_stop_transition(route.id, stop_index, stop.status, stop.stop_type, transport_job_id)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    "❌ Propagación fallida para job {} (ruta {}): {}",
                    transport_job_id, route.id, e
                );
                None
            }
        }
    }

    /// Las fotos de un tramo ya completado se vuelven a reflejar al cambiar
    async fn remirror_if_completed(&self, stop: &Stop) {
        if stop.status != StopStatus::Completed {
            return;
        }
        let (Some(transport_job_id), Some(leg)) = (stop.transport_job_id, job_leg(stop.stop_type)) else {
            return;
        };
        if let Err(e) = self
            .propagation
            .mirror_leg_photos(transport_job_id, leg, &stop.vehicle_photos())
            .await
        {
            error!("❌ No se pudieron reflejar las fotos en el job {}: {}", transport_job_id, e);
        }
    }

    async fn set_truck_status(&self, truck_id: Uuid, status: TruckStatus) {
        if let Err(e) = self.store.update_truck_status(truck_id, status).await {
            error!("❌ No se pudo actualizar el camión {} a {:?}: {}", truck_id, status, e);
        }
    }

    async fn log_action(&self, route_id: Uuid, kind: ActionKind, details: serde_json::Value) {
        match self.ledger.append_action(route_id, kind, None, details).await {
            Ok(_) => {}
            Err(e) if e.is_validation() => {
                debug!("Acción {} fuera del ledger de ruta {}: {}", kind.as_str(), route_id, e)
            }
            Err(e) => {
                warn!("⚠️ Acción {} no registrada en el ledger de ruta {}: {}", kind.as_str(), route_id, e)
            }
        }
    }

    /// Geocodificar paradas sin coordenadas; nunca hace fallar el arranque
    async fn backfill_coordinates(&self, route: &mut Route) {
        let pending: Vec<(usize, String)> = route
            .stops
            .iter()
            .enumerate()
            .filter(|(_, s)| s.coordinates.is_none())
            .filter_map(|(i, s)| s.address.clone().map(|a| (i, a)))
            .collect();
        if pending.is_empty() {
            return;
        }

        let lookups = futures::future::join_all(
            pending.iter().map(|(_, address)| self.geocoder.geocode(address)),
        );
        match tokio::time::timeout(self.settings.geocoding_timeout, lookups).await {
            Ok(results) => {
                let mut resolved = 0;
                for ((index, _), result) in pending.iter().zip(results) {
                    if let Some(geocoded) = result {
                        route.stops[*index].coordinates = Some(geocoded.coordinates);
                        resolved += 1;
                    }
                }
                info!("🗺️ {}/{} paradas geocodificadas para ruta {}", resolved, pending.len(), route.id);
            }
            Err(_) => warn!(
                "⏱️ Geocoding de ruta {} superó {:?}, se arranca sin coordenadas",
                route.id, self.settings.geocoding_timeout
            ),
        }
    }
}

fn state_label(state: RouteState) -> &'static str {
    match state {
        RouteState::Started => "started",
        RouteState::Stopped => "stopped",
        RouteState::Resumed => "resumed",
    }
}

fn job_leg(stop_type: StopType) -> Option<JobLeg> {
    match stop_type {
        StopType::Pickup => Some(JobLeg::Pickup),
        StopType::Drop => Some(JobLeg::Drop),
        _ => None,
    }
}

/// Solo se editan fotos de paradas de una ruta en curso que no se saltaron
fn editable_stop_index(route: &Route, stop_id: Uuid) -> AppResult<usize> {
    if route.status != RouteStatus::InProgress {
        return Err(AppError::InvalidTransition("route is not in progress".to_string()));
    }
    let index = route.stop_index(stop_id).ok_or(AppError::StopNotFound(stop_id))?;
    if route.stops[index].status == StopStatus::Skipped {
        return Err(AppError::InvalidTransition("stop was skipped".to_string()));
    }
    Ok(index)
}

fn transition_details(transition: &StopTransition, stop: &Stop) -> serde_json::Value {
    stop_details(
        stop.id,
        stop.sequence,
        json!({
            "stop_type": stop.stop_type.as_str(),
            "from": transition.from.as_str(),
            "to": transition.to.as_str(),
            "transport_job_id": stop.transport_job_id,
            "reason": stop.skip_reason,
        }),
    )
}
