//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos del núcleo de ejecución de rutas:
//! rutas con sus paradas, jobs de transporte, vehículos, flota y tracking.

pub mod route;
pub mod transport_job;
pub mod vehicle;
pub mod fleet;
pub mod tracking;

pub use route::*;
pub use transport_job::*;
pub use vehicle::*;
pub use fleet::*;
pub use tracking::*;
