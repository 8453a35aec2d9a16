use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use dotenvy::dotenv;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use route_execution::cache::ActiveTrackerCache;
use route_execution::config::{DatabaseConfig, EnvironmentConfig};
use route_execution::controllers::RouteLifecycleController;
use route_execution::database::DatabaseConnection;
use route_execution::middleware::cors_middleware;
use route_execution::repositories::{
    AuditLog, InMemoryAuditLog, InMemoryStore, PostgresAuditLog, PostgresStore, TransportStore,
};
use route_execution::routes::route_routes::{create_admin_router, create_route_router};
use route_execution::services::{
    DisabledGeocoder, GeocodingProvider, MapboxGeocoder, TrackingLedgerService,
};
use route_execution::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();
    let config = EnvironmentConfig::from_env()?;

    // Configurar logging
    let max_level = if config.is_development() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(max_level).init();

    info!("🚚 Route Execution - núcleo de ejecución de rutas");
    info!("================================================");

    if config.is_production() && config.database_url.is_none() {
        return Err(anyhow::anyhow!("DATABASE_URL must be set in production"));
    }

    // Persistencia: PostgreSQL si hay DATABASE_URL, si no memoria
    let (store, audit) = match config.database_url.as_deref() {
        Some(url) => {
            let connection = match DatabaseConnection::connect(&DatabaseConfig::new(url)).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("❌ Error conectando a la base de datos: {}", e);
                    return Err(anyhow::anyhow!("Error de base de datos: {}", e));
                }
            };
            let pool = connection.pool().clone();
            info!("✅ PostgreSQL conectado");
            let store: Arc<dyn TransportStore> = Arc::new(PostgresStore::new(pool.clone()));
            let audit: Arc<dyn AuditLog> = Arc::new(PostgresAuditLog::new(pool));
            (store, audit)
        }
        None => {
            warn!("⚠️ DATABASE_URL no definida, usando store en memoria");
            let store: Arc<dyn TransportStore> = Arc::new(InMemoryStore::new());
            let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
            (store, audit)
        }
    };

    let geocoder: Arc<dyn GeocodingProvider> = match config.mapbox_token.clone() {
        Some(token) => Arc::new(MapboxGeocoder::new(token)?),
        None => {
            warn!("⚠️ MAPBOX_TOKEN no definido, geocoding deshabilitado");
            Arc::new(DisabledGeocoder)
        }
    };

    // Cache de trackers activos con barrido periódico
    let tracker_cache = Arc::new(ActiveTrackerCache::new(config.tracker_cache()));
    let sweeper = tracker_cache.clone().spawn_sweeper();
    info!(
        "🧹 Barrido de trackers cada {}s (inactividad {}s)",
        config.tracker_sweep_interval_secs, config.tracker_idle_timeout_secs
    );

    let ledger = TrackingLedgerService::new(store.clone(), audit, tracker_cache.clone());
    let controller = Arc::new(RouteLifecycleController::new(
        store,
        ledger,
        geocoder,
        config.lifecycle_settings(),
    ));

    let app_state = AppState::new(config.clone(), controller, tracker_cache);

    let app = Router::new()
        .route("/health", get(health_endpoint))
        .nest("/api/routes", create_route_router())
        .nest("/api/admin", create_admin_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_middleware(&config.cors_origins))
        .with_state(app_state);

    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("🚚 Rutas:");
    info!("   GET  /api/routes/:route_id - Obtener ruta");
    info!("   POST /api/routes/:route_id/start|stop|resume|complete - Ciclo de vida");
    info!("   POST /api/routes/:route_id/stops/:stop_id/arrive|complete|skip - Paradas");
    info!("   POST|DELETE /api/routes/:route_id/stops/:stop_id/photos - Fotos");
    info!("📍 Tracking:");
    info!("   GET  /api/routes/:route_id/tracking - Registro de tracking");
    info!("   POST /api/routes/:route_id/tracking/location - Ping de ubicación");
    info!("   POST /api/routes/:route_id/tracking/actions - Pausa, combustible, notas");
    info!("🛠️ Administración:");
    info!("   POST /api/admin/transport-jobs/:job_id/recompute");
    info!("   POST /api/admin/vehicles/:vehicle_id/recompute");
    info!("   GET  /api/admin/tracker-cache/stats");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
    }

    sweeper.abort();
    info!("👋 Servidor terminado");
    Ok(())
}

/// Health check simple
async fn health_endpoint() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "route_execution",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
