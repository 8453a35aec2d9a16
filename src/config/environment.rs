//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::TrackerCacheConfig;
use crate::controllers::LifecycleSettings;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    /// Sin DATABASE_URL se usa el store en memoria
    pub database_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub mapbox_token: Option<String>,
    pub tracker_idle_timeout_secs: u64,
    pub tracker_sweep_interval_secs: u64,
    pub geocoding_timeout_secs: u64,
    pub require_resolved_stops: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let cache = TrackerCacheConfig::default();
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            database_url: None,
            cors_origins: Vec::new(),
            mapbox_token: None,
            tracker_idle_timeout_secs: cache.idle_timeout_secs,
            tracker_sweep_interval_secs: cache.sweep_interval_secs,
            geocoding_timeout_secs: 5,
            require_resolved_stops: false,
        }
    }
}

impl EnvironmentConfig {
    /// Leer la configuración del entorno; las variables ausentes toman su valor por defecto
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            port: parse_var("PORT", defaults.port)?,
            host: env::var("HOST").unwrap_or(defaults.host),
            database_url: non_empty_var("DATABASE_URL"),
            cors_origins: non_empty_var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            mapbox_token: non_empty_var("MAPBOX_TOKEN"),
            tracker_idle_timeout_secs: parse_var(
                "TRACKER_IDLE_TIMEOUT_SECS",
                defaults.tracker_idle_timeout_secs,
            )?,
            tracker_sweep_interval_secs: parse_var(
                "TRACKER_SWEEP_INTERVAL_SECS",
                defaults.tracker_sweep_interval_secs,
            )?,
            geocoding_timeout_secs: parse_var("GEOCODING_TIMEOUT_SECS", defaults.geocoding_timeout_secs)?,
            require_resolved_stops: parse_var(
                "ROUTE_REQUIRE_RESOLVED_STOPS",
                defaults.require_resolved_stops,
            )?,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tracker_cache(&self) -> TrackerCacheConfig {
        TrackerCacheConfig {
            idle_timeout_secs: self.tracker_idle_timeout_secs,
            sweep_interval_secs: self.tracker_sweep_interval_secs,
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            require_resolved_stops: self.require_resolved_stops,
            geocoding_timeout: Duration::from_secs(self.geocoding_timeout_secs),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", name, raw)),
        None => Ok(default),
    }
}
