//! Cache de trackers activos
//!
//! Índice en memoria RouteId -> TrackingRecord de las rutas en curso, para no
//! leer el registro completo de la base de datos en cada ping.
//!
//! Cada entrada tiene su propio lock: dos escrituras sobre la misma ruta se
//! serializan, rutas distintas avanzan en paralelo. El barrido de entradas
//! inactivas nunca desaloja una entrada con una escritura en curso.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::TrackerCacheConfig;
use crate::models::TrackingRecord;

/// Registro cacheado con su última actividad
#[derive(Debug)]
pub struct CachedTracker {
    pub record: TrackingRecord,
    last_touched: Instant,
}

impl CachedTracker {
    fn new(record: TrackingRecord) -> Self {
        Self {
            record,
            last_touched: Instant::now(),
        }
    }

    /// Marcar actividad reciente
    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }
}

pub type TrackerHandle = Arc<Mutex<CachedTracker>>;

/// Estadísticas del cache
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct TrackerCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries_created: u64,
    pub entries_removed: u64,
    pub entries_evicted: u64,
}

pub struct ActiveTrackerCache {
    entries: RwLock<HashMap<Uuid, TrackerHandle>>,
    config: TrackerCacheConfig,
    stats: RwLock<TrackerCacheStats>,
}

impl ActiveTrackerCache {
    pub fn new(config: TrackerCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(TrackerCacheStats::default()),
        }
    }

    /// Obtener el handle de una ruta; el llamador toma el lock de la entrada
    pub async fn get(&self, route_id: Uuid) -> Option<TrackerHandle> {
        let handle = self.entries.read().await.get(&route_id).cloned();
        let mut stats = self.stats.write().await;
        if handle.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
            debug!("❌ Tracker cache MISS para ruta {}", route_id);
        }
        handle
    }

    /// Insertar un registro; si otra petición ya lo llenó, gana la existente
    pub async fn insert(&self, record: TrackingRecord) -> TrackerHandle {
        let route_id = record.route_id;
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&route_id) {
            return existing.clone();
        }
        let handle = Arc::new(Mutex::new(CachedTracker::new(record)));
        entries.insert(route_id, handle.clone());
        drop(entries);

        self.stats.write().await.entries_created += 1;
        debug!("💾 Tracker cacheado para ruta {}", route_id);
        handle
    }

    /// Quitar explícitamente (ruta completada)
    pub async fn remove(&self, route_id: Uuid) -> bool {
        let removed = self.entries.write().await.remove(&route_id).is_some();
        if removed {
            self.stats.write().await.entries_removed += 1;
            debug!("🗑️ Tracker eliminado del cache para ruta {}", route_id);
        }
        removed
    }

    /// Desalojar entradas inactivas que nadie está usando
    pub async fn evict_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let mut entries = self.entries.write().await;

        let stale: Vec<Uuid> = entries
            .iter()
            .filter(|(_, handle)| {
                let handle: &TrackerHandle = handle;
                // Con el mapa bloqueado nadie puede obtener un handle nuevo:
                // otra referencia viva significa una escritura en curso.
                if Arc::strong_count(handle) > 1 {
                    return false;
                }
                match handle.try_lock() {
                    Ok(tracker) => tracker.idle_for() >= idle_timeout,
                    Err(_) => false,
                }
            })
            .map(|(route_id, _)| *route_id)
            .collect();

        for route_id in &stale {
            entries.remove(route_id);
        }
        drop(entries);

        if !stale.is_empty() {
            self.stats.write().await.entries_evicted += stale.len() as u64;
            info!("🧹 Tracker cache: {} entradas inactivas desalojadas", stale.len());
        }
        stale.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn get_stats(&self) -> TrackerCacheStats {
        self.stats.read().await.clone()
    }

    /// Lanzar el barrido periódico en background
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // el primer tick es inmediato
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle().await;
            }
        })
    }
}
