//! Conexión a PostgreSQL
//!
//! Abre el pool y aplica las migraciones de `migrations/` al arrancar.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Conectando a {}", mask_database_url(&config.url));
        let pool = config.create_pool().await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("✅ Migraciones aplicadas");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Enmascarar credenciales de la URL para los logs
fn mask_database_url(url: &str) -> String {
    let Some(at_pos) = url.find('@') else {
        return url.to_string();
    };
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    if scheme_end + 3 > at_pos {
        return url.to_string();
    }
    format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..])
}
