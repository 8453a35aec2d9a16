//! Cache
//!
//! Este módulo contiene el cache en memoria de trackers activos.

pub mod active_tracker_cache;
pub mod cache_config;

pub use active_tracker_cache::{ActiveTrackerCache, CachedTracker, TrackerCacheStats, TrackerHandle};
pub use cache_config::TrackerCacheConfig;
