//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, cálculos
//! geográficos y locks por entidad.

pub mod errors;
pub mod geo;
pub mod keyed_lock;
