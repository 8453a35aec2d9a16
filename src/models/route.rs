//! Modelo de Route
//!
//! Este módulo contiene el agregado Route con sus Stops embebidos.
//! Los stops se persisten como JSONB dentro de la fila de la ruta.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Estado de la ruta - mapea al ENUM route_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "route_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    InProgress,
    Completed,
}

/// Sub-estado de una ruta en curso - mapea al ENUM route_state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "route_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Started,
    Stopped,
    Resumed,
}

/// Tipo de parada
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    Start,
    Pickup,
    Drop,
    Break,
    Rest,
    Fuel,
    End,
}

impl StopType {
    /// Pickup y drop son las únicas paradas ligadas a un TransportJob
    pub fn is_job_leg(&self) -> bool {
        matches!(self, StopType::Pickup | StopType::Drop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Start => "start",
            StopType::Pickup => "pickup",
            StopType::Drop => "drop",
            StopType::Break => "break",
            StopType::Rest => "rest",
            StopType::Fuel => "fuel",
            StopType::End => "end",
        }
    }
}

/// Estado de una parada
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopStatus::Pending => "pending",
            StopStatus::InProgress => "in_progress",
            StopStatus::Completed => "completed",
            StopStatus::Skipped => "skipped",
        }
    }
}

/// Categoría de foto adjunta a una parada
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhotoCategory {
    Vehicle,
    Document,
    Damage,
    Other,
}

/// Referencia a una foto ya subida al almacenamiento de blobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoRef {
    pub url: String,
    pub category: PhotoCategory,
    pub uploaded_at: DateTime<Utc>,
}

/// Item del checklist de inspección
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    pub label: String,
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Coordenadas geográficas
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parada de una ruta - se guarda embebida en routes.stops
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub id: Uuid,
    pub stop_type: StopType,
    pub sequence: i32,
    pub status: StopStatus,
    #[serde(default)]
    pub transport_job_id: Option<Uuid>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// `None` hasta que el conductor envía el checklist
    #[serde(default)]
    pub checklist: Option<Vec<ChecklistItem>>,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn new(stop_type: StopType, sequence: i32, transport_job_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stop_type,
            sequence,
            status: StopStatus::Pending,
            transport_job_id,
            address: None,
            coordinates: None,
            checklist: None,
            photos: Vec::new(),
            skip_reason: None,
            notes: None,
            completed_at: None,
        }
    }

    /// Fotos de categoría vehículo, las que se reflejan en el TransportJob
    pub fn vehicle_photos(&self) -> Vec<PhotoRef> {
        self.photos
            .iter()
            .filter(|p| p.category == PhotoCategory::Vehicle)
            .cloned()
            .collect()
    }
}

/// Route principal - agregado con sus paradas ordenadas por sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub truck_id: Uuid,
    pub status: RouteStatus,
    pub state: Option<RouteState>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub stops: Vec<Stop>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn new(driver_id: Uuid, truck_id: Uuid, mut stops: Vec<Stop>) -> Self {
        stops.sort_by_key(|s| s.sequence);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            truck_id,
            status: RouteStatus::Planned,
            state: None,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            stops,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stop_index(&self, stop_id: Uuid) -> Option<usize> {
        self.stops.iter().position(|s| s.id == stop_id)
    }

    pub fn stop(&self, stop_id: Uuid) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == stop_id)
    }

    /// Parada en curso, si la hay
    pub fn active_stop(&self) -> Option<&Stop> {
        self.stops.iter().find(|s| s.status == StopStatus::InProgress)
    }

    /// Parada de un TransportJob con el tipo indicado (pickup o drop)
    pub fn job_stop(&self, transport_job_id: Uuid, stop_type: StopType) -> Option<&Stop> {
        self.stops
            .iter()
            .find(|s| s.stop_type == stop_type && s.transport_job_id == Some(transport_job_id))
    }

    /// Paradas que aún no se han completado ni saltado
    pub fn unresolved_stops(&self) -> usize {
        self.stops
            .iter()
            .filter(|s| matches!(s.status, StopStatus::Pending | StopStatus::InProgress))
            .count()
    }

    /// `state` solo tiene valor mientras la ruta está en curso
    pub fn state_is_consistent(&self) -> bool {
        self.state.is_some() == (self.status == RouteStatus::InProgress)
    }
}
