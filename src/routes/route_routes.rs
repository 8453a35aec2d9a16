use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::cache::TrackerCacheStats;
use crate::controllers::{RouteCompletion, StopActionOutcome};
use crate::dto::route_dto::{
    ApiResponse, CompleteStopRequest, DriverActionRequest, LocationUpdateRequest, PhotoRequest,
    RecordActionRequest, RemovePhotoRequest, SkipStopRequest,
};
use crate::models::{
    ActionEntry, LocationPoint, Route, Stop, TrackingRecord, TransportJob, VehicleStatus,
};
use crate::services::TransitionContext;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_route_router() -> Router<AppState> {
    Router::new()
        .route("/:route_id", get(get_route))
        .route("/:route_id/start", post(start_route))
        .route("/:route_id/stop", post(stop_route))
        .route("/:route_id/resume", post(resume_route))
        .route("/:route_id/complete", post(complete_route))
        .route("/:route_id/stops/:stop_id/arrive", post(arrive_at_stop))
        .route("/:route_id/stops/:stop_id/complete", post(complete_stop))
        .route("/:route_id/stops/:stop_id/skip", post(skip_stop))
        .route(
            "/:route_id/stops/:stop_id/photos",
            post(attach_photo).delete(remove_photo),
        )
        .route("/:route_id/tracking", get(get_tracking))
        .route("/:route_id/tracking/location", post(record_location))
        .route("/:route_id/tracking/actions", post(record_action))
}

pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/transport-jobs/:job_id/recompute", post(recompute_transport_job))
        .route("/vehicles/:vehicle_id/recompute", post(recompute_vehicle))
        .route("/tracker-cache/stats", get(tracker_cache_stats))
}

async fn get_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Route>>, AppError> {
    let route = state.controller.get_route(route_id).await?;
    Ok(Json(ApiResponse::success(route)))
}

async fn start_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<ApiResponse<Route>>, AppError> {
    let route = state.controller.start_route(route_id, request.driver_id).await?;
    Ok(Json(ApiResponse::success_with_message(route, "Ruta iniciada".to_string())))
}

async fn stop_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<ApiResponse<Route>>, AppError> {
    let route = state.controller.stop_route(route_id, request.driver_id).await?;
    Ok(Json(ApiResponse::success(route)))
}

async fn resume_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<ApiResponse<Route>>, AppError> {
    let route = state.controller.resume_route(route_id, request.driver_id).await?;
    Ok(Json(ApiResponse::success(route)))
}

async fn complete_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<ApiResponse<RouteCompletion>>, AppError> {
    let completion = state.controller.complete_route(route_id, request.driver_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        completion,
        "Ruta completada".to_string(),
    )))
}

async fn arrive_at_stop(
    State(state): State<AppState>,
    Path((route_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<ApiResponse<StopActionOutcome>>, AppError> {
    let outcome = state
        .controller
        .arrive_at_stop(route_id, stop_id, request.driver_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn complete_stop(
    State(state): State<AppState>,
    Path((route_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CompleteStopRequest>,
) -> Result<Json<ApiResponse<StopActionOutcome>>, AppError> {
    request.validate()?;
    let ctx = TransitionContext {
        driver_id: request.driver_id,
        reason: None,
        checklist: request.checklist,
        notes: request.notes,
    };
    let outcome = state.controller.complete_stop(route_id, stop_id, ctx).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn skip_stop(
    State(state): State<AppState>,
    Path((route_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SkipStopRequest>,
) -> Result<Json<ApiResponse<StopActionOutcome>>, AppError> {
    request.validate()?;
    let ctx = TransitionContext {
        driver_id: request.driver_id,
        reason: Some(request.reason),
        checklist: None,
        notes: request.notes,
    };
    let outcome = state.controller.skip_stop(route_id, stop_id, ctx).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn attach_photo(
    State(state): State<AppState>,
    Path((route_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<PhotoRequest>,
) -> Result<Json<ApiResponse<Stop>>, AppError> {
    request.validate()?;
    let driver_id = request.driver_id;
    let stop = state
        .controller
        .attach_photo(route_id, stop_id, driver_id, request.into_photo_ref())
        .await?;
    Ok(Json(ApiResponse::success(stop)))
}

async fn remove_photo(
    State(state): State<AppState>,
    Path((route_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RemovePhotoRequest>,
) -> Result<Json<ApiResponse<Stop>>, AppError> {
    request.validate()?;
    let stop = state
        .controller
        .remove_photo(route_id, stop_id, request.driver_id, &request.url)
        .await?;
    Ok(Json(ApiResponse::success(stop)))
}

async fn get_tracking(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<ApiResponse<TrackingRecord>>, AppError> {
    let record = state.controller.get_tracking(route_id).await?;
    Ok(Json(ApiResponse::success(record)))
}

async fn record_location(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<LocationUpdateRequest>,
) -> Result<Json<ApiResponse<LocationPoint>>, AppError> {
    request.validate()?;
    let driver_id = request.driver_id;
    let point = state
        .controller
        .record_location(route_id, driver_id, request.into_point())
        .await?;
    Ok(Json(ApiResponse::success(point)))
}

async fn record_action(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Json(request): Json<RecordActionRequest>,
) -> Result<Json<ApiResponse<ActionEntry>>, AppError> {
    request.validate()?;
    let location = request.location();
    let entry = state
        .controller
        .record_action(
            route_id,
            request.driver_id,
            request.kind,
            location,
            request.details.unwrap_or_else(|| serde_json::json!({})),
        )
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

async fn recompute_transport_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransportJob>>, AppError> {
    let job = state.controller.recompute_transport_job(job_id).await?;
    Ok(Json(ApiResponse::success(job)))
}

async fn recompute_vehicle(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Option<VehicleStatus>>>, AppError> {
    let status = state.controller.recompute_vehicle(vehicle_id).await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn tracker_cache_stats(
    State(state): State<AppState>,
) -> Json<ApiResponse<TrackerCacheStats>> {
    Json(ApiResponse::success(state.tracker_cache.get_stats().await))
}
