//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::cache::ActiveTrackerCache;
use crate::config::environment::EnvironmentConfig;
use crate::controllers::RouteLifecycleController;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub controller: Arc<RouteLifecycleController>,
    pub tracker_cache: Arc<ActiveTrackerCache>,
}

impl AppState {
    pub fn new(
        config: EnvironmentConfig,
        controller: Arc<RouteLifecycleController>,
        tracker_cache: Arc<ActiveTrackerCache>,
    ) -> Self {
        Self {
            config,
            controller,
            tracker_cache,
        }
    }
}
