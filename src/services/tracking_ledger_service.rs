//! Ledger de tracking
//!
//! Historial append-only de posiciones y acciones de una ruta en curso.
//! Toda escritura pasa primero por el `ActiveTrackerCache`; si la ruta no
//! está cacheada se carga de la base de datos, y si no existe registro pero
//! el conductor tiene la ruta como actual se crea en el momento.
//!
//! Las entradas nunca se modifican: una corrección es una entrada nueva.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{ActiveTrackerCache, TrackerHandle};
use crate::models::{
    ActionEntry, ActionKind, Coordinates, LocationPoint, Route, RouteStatus, TrackingRecord,
    TrackingStatistics, TrackingStatus,
};
use crate::repositories::{AuditLog, TransportStore};
use crate::utils::errors::{AppError, AppResult};
use crate::utils::geo::path_distance_km;

/// Estadísticas de un registro cerrado en `ended_at`
pub fn compute_statistics(record: &TrackingRecord, ended_at: DateTime<Utc>) -> TrackingStatistics {
    let points: Vec<Coordinates> = record.location_history.iter().map(|p| p.coordinates()).collect();
    let total_distance_km = path_distance_km(&points);
    let duration_seconds = (ended_at - record.started_at).num_seconds().max(0);

    let average_speed_kmh = if duration_seconds > 0 {
        total_distance_km / (duration_seconds as f64 / 3600.0)
    } else {
        0.0
    };

    TrackingStatistics {
        total_distance_km,
        duration_seconds,
        stops_completed: record.count_actions(ActionKind::CompleteStop),
        photos_uploaded: record.count_actions(ActionKind::UploadPhoto),
        average_speed_kmh,
        location_points: record.location_history.len() as u32,
    }
}

#[derive(Clone)]
pub struct TrackingLedgerService {
    store: Arc<dyn TransportStore>,
    audit: Arc<dyn AuditLog>,
    cache: Arc<ActiveTrackerCache>,
}

impl TrackingLedgerService {
    pub fn new(
        store: Arc<dyn TransportStore>,
        audit: Arc<dyn AuditLog>,
        cache: Arc<ActiveTrackerCache>,
    ) -> Self {
        Self { store, audit, cache }
    }

    /// Crear el registro al arrancar la ruta y dejarlo cacheado
    pub async fn start_tracking(&self, route: &Route) -> AppResult<TrackingRecord> {
        if let Some(existing) = self.store.find_tracking_record(route.id).await? {
            if existing.is_active() {
                debug!("Tracking ya existente para ruta {}, se reutiliza", route.id);
                let handle = self.cache.insert(existing.clone()).await;
                handle.lock().await.touch();
                return Ok(existing);
            }
            return Err(AppError::TrackingNotActive(route.id));
        }

        let record = TrackingRecord::new(route.id, route.driver_id);
        self.store.insert_tracking_record(&record).await?;
        self.cache.insert(record.clone()).await;
        info!("📍 Tracking iniciado para ruta {}", route.id);
        Ok(record)
    }

    pub async fn append_location(&self, route_id: Uuid, point: LocationPoint) -> AppResult<LocationPoint> {
        let handle = self.resolve(route_id).await?;
        let mut tracker = handle.lock().await;
        if !tracker.record.is_active() {
            return Err(AppError::TrackingNotActive(route_id));
        }

        self.store.append_tracking_location(tracker.record.id, &point).await?;
        tracker.record.location_history.push(point.clone());
        tracker.touch();

        debug!(
            "📍 Ubicación ({:.5}, {:.5}) registrada para ruta {}",
            point.latitude, point.longitude, route_id
        );
        Ok(point)
    }

    /// Registrar una acción; sin ubicación explícita se usa la última conocida
    pub async fn append_action(
        &self,
        route_id: Uuid,
        kind: ActionKind,
        location: Option<Coordinates>,
        details: serde_json::Value,
    ) -> AppResult<ActionEntry> {
        let handle = self.resolve(route_id).await?;
        let mut tracker = handle.lock().await;
        if !tracker.record.is_active() {
            return Err(AppError::TrackingNotActive(route_id));
        }

        let location = location.or_else(|| tracker.record.last_location());
        let audit_log_id = match self
            .audit
            .record(
                kind.as_str(),
                "route",
                route_id,
                Some(tracker.record.driver_id),
                &details,
                None,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("⚠️ No se pudo registrar {} en audit log: {}", kind.as_str(), e);
                None
            }
        };

        let entry = ActionEntry {
            timestamp: Utc::now(),
            kind,
            location,
            details,
            audit_log_id,
        };

        self.store.append_tracking_action(tracker.record.id, &entry).await?;
        tracker.record.action_history.push(entry.clone());
        tracker.touch();

        debug!("📝 Acción {} registrada para ruta {}", kind.as_str(), route_id);
        Ok(entry)
    }

    /// Cerrar el registro, calcular estadísticas y sacarlo del cache
    pub async fn finalize(&self, route_id: Uuid) -> AppResult<TrackingStatistics> {
        let handle = match self.cache.get(route_id).await {
            Some(handle) => handle,
            None => {
                let record = self
                    .store
                    .find_tracking_record(route_id)
                    .await?
                    .ok_or(AppError::TrackingNotActive(route_id))?;
                if !record.is_active() {
                    // ya finalizado: devolver lo calculado entonces
                    return Ok(record.statistics.unwrap_or_default());
                }
                self.cache.insert(record).await
            }
        };

        let mut tracker = handle.lock().await;
        let ended_at = Utc::now();
        let statistics = compute_statistics(&tracker.record, ended_at);

        let mut closed = tracker.record.clone();
        closed.status = TrackingStatus::Completed;
        closed.completed_at = Some(ended_at);
        closed.statistics = Some(statistics.clone());
        self.store.update_tracking_summary(&closed).await?;

        tracker.record.status = closed.status;
        tracker.record.completed_at = closed.completed_at;
        tracker.record.statistics = closed.statistics;
        drop(tracker);
        self.cache.remove(route_id).await;

        info!(
            "🏁 Tracking finalizado para ruta {}: {:.2} km, {} paradas, {} fotos",
            route_id, statistics.total_distance_km, statistics.stops_completed, statistics.photos_uploaded
        );
        Ok(statistics)
    }

    /// Registro actual (cache o base de datos), sin crear nada
    pub async fn current(&self, route_id: Uuid) -> AppResult<Option<TrackingRecord>> {
        if let Some(handle) = self.cache.get(route_id).await {
            return Ok(Some(handle.lock().await.record.clone()));
        }
        self.store.find_tracking_record(route_id).await
    }

    /// Handle cacheado de una ruta activa: cache, luego base de datos,
    /// luego creación bajo demanda si el conductor tiene la ruta activa
    async fn resolve(&self, route_id: Uuid) -> AppResult<TrackerHandle> {
        if let Some(handle) = self.cache.get(route_id).await {
            return Ok(handle);
        }

        if let Some(record) = self.store.find_tracking_record(route_id).await? {
            if !record.is_active() {
                return Err(AppError::TrackingNotActive(route_id));
            }
            return Ok(self.cache.insert(record).await);
        }

        let route = self
            .store
            .find_route(route_id)
            .await?
            .ok_or(AppError::RouteNotFound(route_id))?;
        let driver = self
            .store
            .find_driver(route.driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver '{}'", route.driver_id)))?;

        let route_is_active =
            route.status == RouteStatus::InProgress && driver.current_route_id == Some(route_id);
        if !route_is_active {
            return Err(AppError::TrackingNotActive(route_id));
        }

        warn!("⚠️ Ruta {} activa sin registro de tracking, se crea bajo demanda", route_id);
        let record = TrackingRecord::new(route_id, route.driver_id);
        if let Err(e) = self.store.insert_tracking_record(&record).await {
            // otra petición pudo crearlo entre medias
            let existing = self.store.find_tracking_record(route_id).await?;
            return match existing {
                Some(existing) if existing.is_active() => Ok(self.cache.insert(existing).await),
                _ => Err(e),
            };
        }
        Ok(self.cache.insert(record).await)
    }
}

/// Detalle estándar para acciones ligadas a una parada
pub fn stop_details(stop_id: Uuid, sequence: i32, extra: serde_json::Value) -> serde_json::Value {
    let mut details = json!({ "stop_id": stop_id, "sequence": sequence });
    if let (Some(target), serde_json::Value::Object(extra)) = (details.as_object_mut(), extra) {
        target.extend(extra);
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TrackerCacheConfig;
    use crate::models::{Driver, RouteState, Stop, StopType};
    use crate::repositories::{InMemoryAuditLog, InMemoryStore};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        audit: Arc<InMemoryAuditLog>,
        cache: Arc<ActiveTrackerCache>,
        ledger: TrackingLedgerService,
        route_id: Uuid,
    }

    async fn fixture(driver_on_route: bool) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let cache = Arc::new(ActiveTrackerCache::new(TrackerCacheConfig::default()));

        let mut driver = Driver::new("Camille");
        let mut route = Route::new(driver.id, Uuid::new_v4(), vec![Stop::new(StopType::Start, 1, None)]);
        route.status = RouteStatus::InProgress;
        route.state = Some(RouteState::Started);
        if driver_on_route {
            driver.current_route_id = Some(route.id);
        }
        let route_id = route.id;
        store.insert_driver(driver).await;
        store.insert_route(route).await;

        let ledger = TrackingLedgerService::new(store.clone(), audit.clone(), cache.clone());
        Fixture { store, audit, cache, ledger, route_id }
    }

    fn ping(latitude: f64, longitude: f64) -> LocationPoint {
        LocationPoint {
            timestamp: Utc::now(),
            latitude,
            longitude,
            accuracy: Some(5.0),
            speed: None,
            heading: None,
        }
    }

    #[tokio::test]
    async fn test_record_created_on_demand_for_active_route() {
        let f = fixture(true).await;

        f.ledger.append_location(f.route_id, ping(48.85, 2.35)).await.unwrap();

        let stored = f.store.find_tracking_record(f.route_id).await.unwrap().unwrap();
        assert_eq!(stored.location_history.len(), 1);
        assert_eq!(f.cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_rejected_when_route_not_active_for_driver() {
        let f = fixture(false).await;
        let err = f.ledger.append_location(f.route_id, ping(48.85, 2.35)).await.unwrap_err();
        assert!(matches!(err, AppError::TrackingNotActive(_)));
        assert!(f.store.find_tracking_record(f.route_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lazy_fill_after_eviction() {
        let f = fixture(true).await;
        f.ledger.append_location(f.route_id, ping(48.85, 2.35)).await.unwrap();
        f.cache.remove(f.route_id).await;

        f.ledger.append_location(f.route_id, ping(48.86, 2.36)).await.unwrap();

        let record = f.ledger.current(f.route_id).await.unwrap().unwrap();
        assert_eq!(record.location_history.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_pings_are_kept() {
        let f = fixture(true).await;
        let point = ping(45.764, 4.8357);
        f.ledger.append_location(f.route_id, point.clone()).await.unwrap();
        f.ledger.append_location(f.route_id, point.clone()).await.unwrap();

        let stored = f.store.find_tracking_record(f.route_id).await.unwrap().unwrap();
        assert_eq!(stored.location_history, vec![point.clone(), point]);
    }

    #[tokio::test]
    async fn test_action_references_audit_entry_and_last_location() {
        let f = fixture(true).await;
        f.ledger.append_location(f.route_id, ping(48.85, 2.35)).await.unwrap();

        let entry = f
            .ledger
            .append_action(f.route_id, ActionKind::Fuel, None, json!({ "liters": 120 }))
            .await
            .unwrap();

        let audit = f.audit.entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(entry.audit_log_id, Some(audit[0].id));
        assert_eq!(audit[0].action, "fuel");
        assert_eq!(entry.location, Some(Coordinates { latitude: 48.85, longitude: 2.35 }));
    }

    #[tokio::test]
    async fn test_finalize_is_terminal_and_history_is_frozen() {
        let f = fixture(true).await;
        f.ledger.append_location(f.route_id, ping(48.8566, 2.3522)).await.unwrap();
        f.ledger.append_location(f.route_id, ping(48.8606, 2.3376)).await.unwrap();
        f.ledger
            .append_action(f.route_id, ActionKind::CompleteStop, None, json!({}))
            .await
            .unwrap();

        let stats = f.ledger.finalize(f.route_id).await.unwrap();
        assert_eq!(stats.stops_completed, 1);
        assert_eq!(stats.location_points, 2);
        assert!(stats.total_distance_km > 1.0 && stats.total_distance_km < 1.5);
        assert_eq!(f.cache.len().await, 0);

        let before = f.store.find_tracking_record(f.route_id).await.unwrap().unwrap();
        let err = f.ledger.append_location(f.route_id, ping(48.87, 2.34)).await.unwrap_err();
        assert!(matches!(err, AppError::TrackingNotActive(_)));
        let err = f
            .ledger
            .append_action(f.route_id, ActionKind::Note, None, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TrackingNotActive(_)));

        let after = f.store.find_tracking_record(f.route_id).await.unwrap().unwrap();
        assert_eq!(after.status, TrackingStatus::Completed);
        assert_eq!(before.location_history, after.location_history);
        assert_eq!(before.action_history, after.action_history);

        // finalizar otra vez devuelve las mismas estadísticas
        assert_eq!(f.ledger.finalize(f.route_id).await.unwrap(), stats);
    }

    #[test]
    fn test_statistics_average_speed() {
        let mut record = TrackingRecord::new(Uuid::new_v4(), Uuid::new_v4());
        record.started_at = Utc::now() - Duration::hours(2);
        record.location_history = vec![ping(48.8566, 2.3522), ping(45.7640, 4.8357)];
        record.action_history.push(ActionEntry {
            timestamp: Utc::now(),
            kind: ActionKind::UploadPhoto,
            location: None,
            details: json!({}),
            audit_log_id: None,
        });

        let ended_at = record.started_at + Duration::hours(2);
        let stats = compute_statistics(&record, ended_at);

        assert_eq!(stats.duration_seconds, 7200);
        assert_eq!(stats.photos_uploaded, 1);
        assert!((stats.average_speed_kmh - stats.total_distance_km / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_zero_duration() {
        let record = TrackingRecord::new(Uuid::new_v4(), Uuid::new_v4());
        let stats = compute_statistics(&record, record.started_at);
        assert_eq!(stats.average_speed_kmh, 0.0);
        assert_eq!(stats.total_distance_km, 0.0);
    }

    #[test]
    fn test_stop_details_merges_extra_fields() {
        let stop_id = Uuid::new_v4();
        let details = stop_details(stop_id, 3, json!({ "reason": "closed" }));
        assert_eq!(details["sequence"], 3);
        assert_eq!(details["reason"], "closed");
    }
}
