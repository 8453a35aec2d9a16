//! Modelo de tracking
//!
//! Registro append-only de posiciones y acciones del conductor para una ruta
//! en curso. Las entradas nunca se modifican una vez agregadas.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::route::Coordinates;

/// Estado del registro de tracking - mapea al ENUM tracking_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "tracking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Active,
    Completed,
    Cancelled,
}

/// Tipo de acción registrada - mapea al ENUM tracking_action_kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "tracking_action_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    StartRoute,
    StopRoute,
    ResumeRoute,
    CompleteRoute,
    ArriveStop,
    CompleteStop,
    SkipStop,
    UploadPhoto,
    RemovePhoto,
    Break,
    Fuel,
    Note,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::StartRoute => "start_route",
            ActionKind::StopRoute => "stop_route",
            ActionKind::ResumeRoute => "resume_route",
            ActionKind::CompleteRoute => "complete_route",
            ActionKind::ArriveStop => "arrive_stop",
            ActionKind::CompleteStop => "complete_stop",
            ActionKind::SkipStop => "skip_stop",
            ActionKind::UploadPhoto => "upload_photo",
            ActionKind::RemovePhoto => "remove_photo",
            ActionKind::Break => "break",
            ActionKind::Fuel => "fuel",
            ActionKind::Note => "note",
        }
    }
}

/// Ping de ubicación
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl LocationPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Acción discreta del conductor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub location: Option<Coordinates>,
    pub details: serde_json::Value,
    /// Referencia a la entrada del audit log, si se pudo registrar
    pub audit_log_id: Option<Uuid>,
}

/// Estadísticas calculadas al finalizar la ruta
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackingStatistics {
    pub total_distance_km: f64,
    pub duration_seconds: i64,
    pub stops_completed: u32,
    pub photos_uploaded: u32,
    pub average_speed_kmh: f64,
    pub location_points: u32,
}

/// Registro de tracking - uno por ruta en curso
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: Uuid,
    pub route_id: Uuid,
    pub driver_id: Uuid,
    pub status: TrackingStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub location_history: Vec<LocationPoint>,
    pub action_history: Vec<ActionEntry>,
    pub statistics: Option<TrackingStatistics>,
}

impl TrackingRecord {
    pub fn new(route_id: Uuid, driver_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_id,
            driver_id,
            status: TrackingStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
            location_history: Vec::new(),
            action_history: Vec::new(),
            statistics: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackingStatus::Active
    }

    /// Última posición conocida del conductor
    pub fn last_location(&self) -> Option<Coordinates> {
        self.location_history.last().map(|p| p.coordinates())
    }

    pub fn count_actions(&self, kind: ActionKind) -> u32 {
        self.action_history.iter().filter(|a| a.kind == kind).count() as u32
    }
}
