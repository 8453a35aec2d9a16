//! Conductores y camiones
//!
//! Entidades mínimas que el ciclo de vida de la ruta necesita tocar.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del camión - mapea al ENUM truck_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "truck_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TruckStatus {
    Available,
    InUse,
    Maintenance,
}

/// Conductor - mapea a la tabla drivers
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub current_route_id: Option<Uuid>,
}

impl Driver {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            current_route_id: None,
        }
    }
}

/// Camión portavehículos - mapea a la tabla trucks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Truck {
    pub id: Uuid,
    pub license_plate: String,
    pub status: TruckStatus,
}

impl Truck {
    pub fn new(license_plate: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            license_plate: license_plate.to_string(),
            status: TruckStatus::Available,
        }
    }
}
