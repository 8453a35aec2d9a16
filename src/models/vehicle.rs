//! Modelo de Vehicle
//!
//! El vehículo transportado (la carga), no el camión que lo lleva.
//! Su estado se deriva de los TransportJobs que lo referencian.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::transport_job::TransportJobStatus;

/// Estado del vehículo - mapea al ENUM vehicle_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "vehicle_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    NeedsDispatch,
    Dispatched,
    InTransit,
    Delivered,
    Cancelled,
}

impl From<TransportJobStatus> for VehicleStatus {
    fn from(status: TransportJobStatus) -> Self {
        match status {
            TransportJobStatus::NeedsDispatch => VehicleStatus::NeedsDispatch,
            TransportJobStatus::Dispatched => VehicleStatus::Dispatched,
            TransportJobStatus::InTransit => VehicleStatus::InTransit,
            TransportJobStatus::Delivered => VehicleStatus::Delivered,
            TransportJobStatus::Cancelled => VehicleStatus::Cancelled,
        }
    }
}

/// Vehicle principal - mapea a la tabla vehicles
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub vin: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(vin: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vin,
            make: None,
            model: None,
            status: VehicleStatus::NeedsDispatch,
            created_at: now,
            updated_at: now,
        }
    }
}
