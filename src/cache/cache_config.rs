//! Configuración de cache
//!
//! Este módulo contiene la configuración del cache de trackers activos.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuración del cache de trackers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCacheConfig {
    /// Segundos sin escrituras antes de desalojar una entrada
    pub idle_timeout_secs: u64,
    /// Cada cuántos segundos corre el barrido de entradas inactivas
    pub sweep_interval_secs: u64,
}

impl Default for TrackerCacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800, // 30 minutos
            sweep_interval_secs: 300,
        }
    }
}

impl TrackerCacheConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
