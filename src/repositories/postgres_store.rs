//! Store PostgreSQL
//!
//! Implementación de `TransportStore` sobre sqlx. Las paradas viven en la
//! columna JSONB `routes.stops`; el historial de tracking en tablas
//! append-only (`tracking_locations`, `tracking_actions`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::transport_store::TransportStore;
use crate::models::{
    ActionEntry, ActionKind, Coordinates, Driver, JobLeg, LocationPoint, PhotoRef, Route,
    RouteState, RouteStatus, Stop, TrackingRecord, TrackingStatistics, TrackingStatus,
    TransportJob, TransportJobStatus, Truck, TruckStatus, Vehicle, VehicleStatus,
};
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    driver_id: Uuid,
    truck_id: Uuid,
    status: RouteStatus,
    state: Option<RouteState>,
    planned_start: Option<DateTime<Utc>>,
    planned_end: Option<DateTime<Utc>>,
    actual_start: Option<DateTime<Utc>>,
    actual_end: Option<DateTime<Utc>>,
    stops: Json<Vec<Stop>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        let mut stops = row.stops.0;
        stops.sort_by_key(|s| s.sequence);
        Self {
            id: row.id,
            driver_id: row.driver_id,
            truck_id: row.truck_id,
            status: row.status,
            state: row.state,
            planned_start: row.planned_start,
            planned_end: row.planned_end,
            actual_start: row.actual_start,
            actual_end: row.actual_end,
            stops,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransportJobRow {
    id: Uuid,
    vehicle_id: Uuid,
    pickup_route_id: Option<Uuid>,
    drop_route_id: Option<Uuid>,
    status: TransportJobStatus,
    pickup_photos: Json<Vec<PhotoRef>>,
    drop_photos: Json<Vec<PhotoRef>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransportJobRow> for TransportJob {
    fn from(row: TransportJobRow) -> Self {
        Self {
            id: row.id,
            vehicle_id: row.vehicle_id,
            pickup_route_id: row.pickup_route_id,
            drop_route_id: row.drop_route_id,
            status: row.status,
            pickup_photos: row.pickup_photos.0,
            drop_photos: row.drop_photos.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TrackingRow {
    id: Uuid,
    route_id: Uuid,
    driver_id: Uuid,
    status: TrackingStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    statistics: Option<Json<TrackingStatistics>>,
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    recorded_at: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    speed: Option<f64>,
    heading: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    recorded_at: DateTime<Utc>,
    kind: ActionKind,
    latitude: Option<f64>,
    longitude: Option<f64>,
    details: serde_json::Value,
    audit_log_id: Option<Uuid>,
}

impl From<ActionRow> for ActionEntry {
    fn from(row: ActionRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        };
        Self {
            timestamp: row.recorded_at,
            kind: row.kind,
            location,
            details: row.details,
            audit_log_id: row.audit_log_id,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransportStore for PostgresStore {
    async fn find_route(&self, id: Uuid) -> AppResult<Option<Route>> {
        let row = sqlx::query_as::<_, RouteRow>("SELECT * FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Route::from))
    }

    async fn save_route(&self, route: &Route) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO routes (id, driver_id, truck_id, status, state, planned_start, planned_end,
                                actual_start, actual_end, stops, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (id) DO UPDATE
            SET driver_id = EXCLUDED.driver_id,
                truck_id = EXCLUDED.truck_id,
                status = EXCLUDED.status,
                state = EXCLUDED.state,
                planned_start = EXCLUDED.planned_start,
                planned_end = EXCLUDED.planned_end,
                actual_start = EXCLUDED.actual_start,
                actual_end = EXCLUDED.actual_end,
                stops = EXCLUDED.stops,
                updated_at = NOW()
            "#,
        )
        .bind(route.id)
        .bind(route.driver_id)
        .bind(route.truck_id)
        .bind(route.status)
        .bind(route.state)
        .bind(route.planned_start)
        .bind(route.planned_end)
        .bind(route.actual_start)
        .bind(route.actual_end)
        .bind(Json(&route.stops))
        .bind(route.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_stop(&self, route_id: Uuid, stop: &Stop) -> AppResult<()> {
        // Reemplaza el elemento del array conservando el orden original
        let result = sqlx::query(
            r#"
            UPDATE routes
            SET stops = (
                    SELECT jsonb_agg(CASE WHEN elem->>'id' = $2 THEN $3::jsonb ELSE elem END ORDER BY ord)
                    FROM jsonb_array_elements(stops) WITH ORDINALITY AS t(elem, ord)
                ),
                updated_at = NOW()
            WHERE id = $1
              AND EXISTS (SELECT 1 FROM jsonb_array_elements(stops) AS s(elem) WHERE elem->>'id' = $2)
            "#,
        )
        .bind(route_id)
        .bind(stop.id.to_string())
        .bind(Json(stop))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::StopNotFound(stop.id));
        }
        Ok(())
    }

    async fn find_transport_job(&self, id: Uuid) -> AppResult<Option<TransportJob>> {
        let row = sqlx::query_as::<_, TransportJobRow>("SELECT * FROM transport_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TransportJob::from))
    }

    async fn find_transport_jobs_by_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vec<TransportJob>> {
        let rows = sqlx::query_as::<_, TransportJobRow>(
            "SELECT * FROM transport_jobs WHERE vehicle_id = $1 ORDER BY created_at ASC",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TransportJob::from).collect())
    }

    async fn compare_and_set_transport_job_status(
        &self,
        id: Uuid,
        expected: TransportJobStatus,
        status: TransportJobStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE transport_jobs SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transport_jobs WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::NotFound(format!("transport job '{}'", id)));
        }
        Ok(false)
    }

    async fn replace_transport_job_photos(&self, id: Uuid, leg: JobLeg, photos: &[PhotoRef]) -> AppResult<()> {
        let query = match leg {
            JobLeg::Pickup => "UPDATE transport_jobs SET pickup_photos = $2, updated_at = NOW() WHERE id = $1",
            JobLeg::Drop => "UPDATE transport_jobs SET drop_photos = $2, updated_at = NOW() WHERE id = $1",
        };

        let result = sqlx::query(query)
            .bind(id)
            .bind(Json(photos))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("transport job '{}'", id)));
        }
        Ok(())
    }

    async fn find_vehicle(&self, id: Uuid) -> AppResult<Option<Vehicle>> {
        let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(vehicle)
    }

    async fn update_vehicle_status(&self, id: Uuid, status: VehicleStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE vehicles SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("vehicle '{}'", id)));
        }
        Ok(())
    }

    async fn find_driver(&self, id: Uuid) -> AppResult<Option<Driver>> {
        let driver = sqlx::query_as::<_, Driver>("SELECT id, name, current_route_id FROM drivers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(driver)
    }

    async fn claim_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()> {
        // Una sola sentencia: el lock de fila serializa dos claims simultáneos
        let current: Option<Option<Uuid>> = sqlx::query_scalar(
            "UPDATE drivers SET current_route_id = CASE \
                 WHEN current_route_id IS NULL OR current_route_id = $2 THEN $2 \
                 ELSE current_route_id END \
             WHERE id = $1 \
             RETURNING current_route_id",
        )
        .bind(driver_id)
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?;

        match current {
            None => Err(AppError::NotFound(format!("driver '{}'", driver_id))),
            Some(Some(active_route_id)) if active_route_id != route_id => {
                Err(AppError::DriverHasOtherActiveRoute { active_route_id })
            }
            Some(_) => Ok(()),
        }
    }

    async fn release_driver_route(&self, driver_id: Uuid, route_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE drivers SET current_route_id = NULL WHERE id = $1 AND current_route_id = $2")
            .bind(driver_id)
            .bind(route_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_truck(&self, id: Uuid) -> AppResult<Option<Truck>> {
        let truck = sqlx::query_as::<_, Truck>("SELECT id, license_plate, status FROM trucks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(truck)
    }

    async fn update_truck_status(&self, id: Uuid, status: TruckStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE trucks SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("truck '{}'", id)));
        }
        Ok(())
    }

    async fn find_tracking_record(&self, route_id: Uuid) -> AppResult<Option<TrackingRecord>> {
        let Some(row) = sqlx::query_as::<_, TrackingRow>(
            r#"
            SELECT id, route_id, driver_id, status, started_at, completed_at, statistics
            FROM tracking_records
            WHERE route_id = $1
            "#,
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let locations = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT recorded_at, latitude, longitude, accuracy, speed, heading
            FROM tracking_locations
            WHERE tracking_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let actions = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT recorded_at, kind, latitude, longitude, details, audit_log_id
            FROM tracking_actions
            WHERE tracking_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TrackingRecord {
            id: row.id,
            route_id: row.route_id,
            driver_id: row.driver_id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            location_history: locations
                .into_iter()
                .map(|l| LocationPoint {
                    timestamp: l.recorded_at,
                    latitude: l.latitude,
                    longitude: l.longitude,
                    accuracy: l.accuracy,
                    speed: l.speed,
                    heading: l.heading,
                })
                .collect(),
            action_history: actions.into_iter().map(ActionEntry::from).collect(),
            statistics: row.statistics.map(|s| s.0),
        }))
    }

    async fn insert_tracking_record(&self, record: &TrackingRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracking_records (id, route_id, driver_id, status, started_at, completed_at, statistics)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.route_id)
        .bind(record.driver_id)
        .bind(record.status)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.statistics.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_tracking_location(&self, tracking_id: Uuid, point: &LocationPoint) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracking_locations (tracking_id, recorded_at, latitude, longitude, accuracy, speed, heading)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tracking_id)
        .bind(point.timestamp)
        .bind(point.latitude)
        .bind(point.longitude)
        .bind(point.accuracy)
        .bind(point.speed)
        .bind(point.heading)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_tracking_action(&self, tracking_id: Uuid, action: &ActionEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracking_actions (tracking_id, recorded_at, kind, latitude, longitude, details, audit_log_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tracking_id)
        .bind(action.timestamp)
        .bind(action.kind)
        .bind(action.location.map(|c| c.latitude))
        .bind(action.location.map(|c| c.longitude))
        .bind(&action.details)
        .bind(action.audit_log_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_tracking_summary(&self, record: &TrackingRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE tracking_records
            SET status = $2, completed_at = $3, statistics = $4
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.completed_at)
        .bind(record.statistics.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
