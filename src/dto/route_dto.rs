use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{ActionKind, ChecklistItem, Coordinates, LocationPoint, PhotoCategory, PhotoRef};

/// Respuesta genérica de la API
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

// Request de start/stop/resume/complete de ruta
#[derive(Debug, Deserialize, Validate)]
pub struct DriverActionRequest {
    pub driver_id: Uuid,
}

// Request para completar una parada
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteStopRequest {
    pub driver_id: Uuid,
    #[validate(length(min = 1))]
    pub checklist: Option<Vec<ChecklistItem>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

// Request para saltar una parada
#[derive(Debug, Deserialize, Validate)]
pub struct SkipStopRequest {
    pub driver_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

// Request para adjuntar una foto ya subida
#[derive(Debug, Deserialize, Validate)]
pub struct PhotoRequest {
    pub driver_id: Uuid,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    pub category: PhotoCategory,
}

impl PhotoRequest {
    pub fn into_photo_ref(self) -> PhotoRef {
        PhotoRef {
            url: self.url,
            category: self.category,
            uploaded_at: Utc::now(),
        }
    }
}

// Request para quitar una foto
#[derive(Debug, Deserialize, Validate)]
pub struct RemovePhotoRequest {
    pub driver_id: Uuid,
    #[validate(length(min = 1))]
    pub url: String,
}

// Ping de ubicación del móvil
#[derive(Debug, Deserialize, Validate)]
pub struct LocationUpdateRequest {
    pub driver_id: Uuid,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 0.0))]
    pub accuracy: Option<f64>,
    #[validate(range(min = 0.0))]
    pub speed: Option<f64>,
    #[validate(range(min = 0.0, max = 360.0))]
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationUpdateRequest {
    pub fn into_point(self) -> LocationPoint {
        LocationPoint {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
        }
    }
}

// Acción libre del conductor (pausa, combustible, nota)
#[derive(Debug, Deserialize, Validate)]
pub struct RecordActionRequest {
    pub driver_id: Uuid,
    pub kind: ActionKind,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl RecordActionRequest {
    pub fn location(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location_request_rejects_out_of_range() {
        let request: LocationUpdateRequest = serde_json::from_value(json!({
            "driver_id": Uuid::new_v4(),
            "latitude": 95.0,
            "longitude": 2.35
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_skip_request_requires_reason() {
        let request: SkipStopRequest = serde_json::from_value(json!({
            "driver_id": Uuid::new_v4(),
            "reason": ""
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_action_location_needs_both_coordinates() {
        let request: RecordActionRequest = serde_json::from_value(json!({
            "driver_id": Uuid::new_v4(),
            "kind": "fuel",
            "latitude": 48.85
        }))
        .unwrap();
        assert!(request.location().is_none());
    }
}
