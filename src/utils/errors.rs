//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del núcleo de ejecución
//! de rutas y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("route '{0}' not found")]
    RouteNotFound(Uuid),

    #[error("stop '{0}' not found on route")]
    StopNotFound(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("route is not assigned to this driver")]
    NotOwnedByDriver,

    #[error("route is already {0}")]
    AlreadyInTargetState(String),

    #[error("driver already has active route '{active_route_id}'")]
    DriverHasOtherActiveRoute { active_route_id: Uuid },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("a non-empty reason is required to skip a stop")]
    MissingReason,

    #[error("checklist is required to complete this stop")]
    MissingChecklist,

    #[error("route still has {0} unresolved stops")]
    UnresolvedStops(usize),

    #[error("tracking for route '{0}' is not active")]
    TrackingNotActive(Uuid),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Errores de validación: se rechazan sin persistir nada
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::RouteNotFound(_)
                | AppError::StopNotFound(_)
                | AppError::NotFound(_)
                | AppError::NotOwnedByDriver
                | AppError::AlreadyInTargetState(_)
                | AppError::DriverHasOtherActiveRoute { .. }
                | AppError::InvalidTransition(_)
                | AppError::MissingReason
                | AppError::MissingChecklist
                | AppError::UnresolvedStops(_)
                | AppError::TrackingNotActive(_)
        )
    }

    /// Código estable para clientes móviles
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DB_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            AppError::StopNotFound(_) => "STOP_NOT_FOUND",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotOwnedByDriver => "NOT_OWNED_BY_DRIVER",
            AppError::AlreadyInTargetState(_) => "ALREADY_IN_TARGET_STATE",
            AppError::DriverHasOtherActiveRoute { .. } => "DRIVER_HAS_OTHER_ACTIVE_ROUTE",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::MissingReason => "MISSING_REASON",
            AppError::MissingChecklist => "MISSING_CHECKLIST",
            AppError::UnresolvedStops(_) => "UNRESOLVED_STOPS",
            AppError::TrackingNotActive(_) => "TRACKING_NOT_ACTIVE",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_)
            | AppError::MissingReason
            | AppError::MissingChecklist => StatusCode::BAD_REQUEST,
            AppError::RouteNotFound(_) | AppError::StopNotFound(_) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::NotOwnedByDriver => StatusCode::FORBIDDEN,
            AppError::AlreadyInTargetState(_)
            | AppError::DriverHasOtherActiveRoute { .. }
            | AppError::InvalidTransition(_)
            | AppError::UnresolvedStops(_)
            | AppError::TrackingNotActive(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let error_response = match &self {
            AppError::Database(e) => {
                error!("❌ Database error: {}", e);
                ErrorResponse {
                    error: "Database Error".to_string(),
                    message: "An error occurred while accessing the database".to_string(),
                    details: None,
                    code: Some(code.to_string()),
                }
            }
            AppError::Validation(e) => {
                warn!("⚠️ Validation error: {}", e);
                ErrorResponse {
                    error: "Validation Error".to_string(),
                    message: "The provided data is invalid".to_string(),
                    details: Some(json!(e)),
                    code: Some(code.to_string()),
                }
            }
            AppError::ServiceUnavailable(msg) => {
                error!("❌ Dependency error: {}", msg);
                ErrorResponse {
                    error: "Service Unavailable".to_string(),
                    message: msg.clone(),
                    details: None,
                    code: Some(code.to_string()),
                }
            }
            other => {
                warn!("⚠️ Rejected request: {}", other);
                ErrorResponse {
                    error: status
                        .canonical_reason()
                        .unwrap_or("Error")
                        .to_string(),
                    message: other.to_string(),
                    details: None,
                    code: Some(code.to_string()),
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_classified() {
        assert!(AppError::MissingReason.is_validation());
        assert!(AppError::NotOwnedByDriver.is_validation());
        assert!(!AppError::ServiceUnavailable("store down".to_string()).is_validation());
    }

    #[test]
    fn test_status_codes() {
        let response = AppError::MissingReason.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::DriverHasOtherActiveRoute { active_route_id: Uuid::new_v4() }.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::RouteNotFound(Uuid::new_v4()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_dependency_errors_map_to_service_unavailable() {
        let err = AppError::ServiceUnavailable("routes store unavailable".to_string());
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::Database(sqlx::Error::RowNotFound).code(), "DB_ERROR");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AppError::InvalidTransition("stop is not in progress".to_string());
        assert_eq!(err.to_string(), "invalid transition: stop is not in progress");
    }
}
