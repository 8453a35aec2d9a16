//! Controladores
//!
//! Orquestan servicios y repositorios para cada acción del conductor.

pub mod route_lifecycle_controller;

pub use route_lifecycle_controller::{
    LifecycleSettings, RouteCompletion, RouteLifecycleController, StopActionOutcome,
};
