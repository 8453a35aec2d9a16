//! Modelo de TransportJob
//!
//! Un TransportJob representa el movimiento de un vehículo desde una parada
//! pickup hasta una parada drop, que pueden vivir en rutas distintas.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::route::PhotoRef;

/// Estado derivado del job - mapea al ENUM transport_job_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "transport_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransportJobStatus {
    NeedsDispatch,
    Dispatched,
    InTransit,
    Delivered,
    Cancelled,
}

impl TransportJobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TransportJobStatus::NeedsDispatch => "Needs Dispatch",
            TransportJobStatus::Dispatched => "Dispatched",
            TransportJobStatus::InTransit => "In Transit",
            TransportJobStatus::Delivered => "Delivered",
            TransportJobStatus::Cancelled => "Cancelled",
        }
    }
}

/// Tramo del job al que pertenece una parada
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobLeg {
    Pickup,
    Drop,
}

/// TransportJob - mapea a la tabla transport_jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportJob {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub pickup_route_id: Option<Uuid>,
    pub drop_route_id: Option<Uuid>,
    pub status: TransportJobStatus,
    pub pickup_photos: Vec<PhotoRef>,
    pub drop_photos: Vec<PhotoRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransportJob {
    pub fn new(vehicle_id: Uuid, pickup_route_id: Option<Uuid>, drop_route_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            pickup_route_id,
            drop_route_id,
            status: TransportJobStatus::NeedsDispatch,
            pickup_photos: Vec::new(),
            drop_photos: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn photos(&self, leg: JobLeg) -> &[PhotoRef] {
        match leg {
            JobLeg::Pickup => &self.pickup_photos,
            JobLeg::Drop => &self.drop_photos,
        }
    }
}
