//! Máquina de estados de paradas
//!
//! Valida y aplica transiciones de una parada dentro de su ruta y mantiene
//! los invariantes de secuencia:
//!
//! - como mucho una parada `InProgress` por ruta
//! - las paradas se procesan en orden ascendente de `sequence`
//! - una parada `Skipped` no bloquea la promoción de la siguiente
//!
//! Todas las validaciones ocurren antes de mutar la ruta, así que un error
//! deja el agregado intacto.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ChecklistItem, Route, RouteStatus, StopStatus, StopType};
use crate::utils::errors::{AppError, AppResult};

/// Datos que acompañan la petición del conductor
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub driver_id: Uuid,
    pub reason: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub notes: Option<String>,
}

impl TransitionContext {
    pub fn for_driver(driver_id: Uuid) -> Self {
        Self {
            driver_id,
            ..Default::default()
        }
    }
}

/// Parada promovida automáticamente a `InProgress`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub stop_id: Uuid,
    pub stop_index: usize,
}

/// Resultado de una transición aplicada
#[derive(Debug, Clone)]
pub struct StopTransition {
    pub route_id: Uuid,
    pub stop_id: Uuid,
    pub stop_index: usize,
    pub stop_type: StopType,
    pub transport_job_id: Option<Uuid>,
    pub from: StopStatus,
    pub to: StopStatus,
    pub promoted: Option<Promotion>,
}

impl StopTransition {
    /// Solo pickup/drop disparan la propagación de estados
    pub fn touches_transport_job(&self) -> bool {
        self.stop_type.is_job_leg() && self.transport_job_id.is_some()
    }
}

/// Validar y aplicar `requested` sobre la parada `stop_id` de la ruta
pub fn transition(
    route: &mut Route,
    stop_id: Uuid,
    requested: StopStatus,
    ctx: &TransitionContext,
) -> AppResult<StopTransition> {
    if route.driver_id != ctx.driver_id {
        return Err(AppError::NotOwnedByDriver);
    }
    if route.status != RouteStatus::InProgress {
        return Err(AppError::InvalidTransition("route is not in progress".to_string()));
    }

    let index = route.stop_index(stop_id).ok_or(AppError::StopNotFound(stop_id))?;
    let from = route.stops[index].status;
    validate(route, index, from, requested, ctx)?;

    let stop = &mut route.stops[index];
    stop.status = requested;
    if let Some(notes) = ctx.notes.as_ref() {
        stop.notes = Some(notes.clone());
    }
    match requested {
        StopStatus::Completed => {
            if let Some(checklist) = ctx.checklist.as_ref() {
                stop.checklist = Some(checklist.clone());
            }
            stop.completed_at = Some(Utc::now());
        }
        StopStatus::Skipped => {
            stop.skip_reason = ctx.reason.as_ref().map(|r| r.trim().to_string());
        }
        StopStatus::Pending | StopStatus::InProgress => {}
    }

    let stop_type = stop.stop_type;
    let transport_job_id = stop.transport_job_id;

    let promoted = if from == StopStatus::InProgress {
        promote_next(route)
    } else {
        None
    };
    debug_assert!(has_single_active_stop(route));

    Ok(StopTransition {
        route_id: route.id,
        stop_id,
        stop_index: index,
        stop_type,
        transport_job_id,
        from,
        to: requested,
        promoted,
    })
}

fn validate(
    route: &Route,
    index: usize,
    from: StopStatus,
    requested: StopStatus,
    ctx: &TransitionContext,
) -> AppResult<()> {
    let stop = &route.stops[index];

    match (from, requested) {
        (StopStatus::Pending, StopStatus::InProgress) => {
            if route.active_stop().is_some() {
                return Err(AppError::InvalidTransition(
                    "another stop is already in progress".to_string(),
                ));
            }
            if next_pending_index(route) != Some(index) {
                return Err(AppError::InvalidTransition(
                    "stops must be processed in sequence order".to_string(),
                ));
            }
            Ok(())
        }
        (StopStatus::InProgress, StopStatus::Completed) => {
            if stop.stop_type.is_job_leg() {
                if stop.transport_job_id.is_none() {
                    return Err(AppError::InvalidTransition(format!(
                        "{} stop has no transport job",
                        stop.stop_type.as_str()
                    )));
                }
                if ctx.checklist.is_none() && stop.checklist.is_none() {
                    return Err(AppError::MissingChecklist);
                }
            }
            Ok(())
        }
        (StopStatus::InProgress, StopStatus::Skipped) => {
            if !stop.stop_type.is_job_leg() {
                return Err(AppError::InvalidTransition(
                    "only pickup and drop stops can be skipped".to_string(),
                ));
            }
            let has_reason = ctx
                .reason
                .as_deref()
                .map(|r| !r.trim().is_empty())
                .unwrap_or(false);
            if !has_reason {
                return Err(AppError::MissingReason);
            }
            Ok(())
        }
        (StopStatus::Pending, StopStatus::Skipped) => Err(AppError::InvalidTransition(
            "stop must be in progress before it can be skipped".to_string(),
        )),
        (StopStatus::Pending, StopStatus::Completed) => {
            Err(AppError::InvalidTransition("stop is not in progress".to_string()))
        }
        (current, target) if current == target => Err(AppError::InvalidTransition(format!(
            "stop is already {}",
            current.as_str()
        ))),
        (current, target) => Err(AppError::InvalidTransition(format!(
            "cannot move stop from {} to {}",
            current.as_str(),
            target.as_str()
        ))),
    }
}

/// Índice de la parada `Pending` con menor `sequence`
fn next_pending_index(route: &Route) -> Option<usize> {
    route
        .stops
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == StopStatus::Pending)
        .min_by_key(|(_, s)| s.sequence)
        .map(|(i, _)| i)
}

/// Promover la siguiente parada pendiente si no hay ninguna en curso
pub fn promote_next(route: &mut Route) -> Option<Promotion> {
    if route.active_stop().is_some() {
        return None;
    }
    let index = next_pending_index(route)?;
    let stop = &mut route.stops[index];
    stop.status = StopStatus::InProgress;
    Some(Promotion {
        stop_id: stop.id,
        stop_index: index,
    })
}

/// Invariante: como mucho una parada en curso
pub fn has_single_active_stop(route: &Route) -> bool {
    route
        .stops
        .iter()
        .filter(|s| s.status == StopStatus::InProgress)
        .count()
        <= 1
}
