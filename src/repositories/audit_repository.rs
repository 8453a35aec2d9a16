//! Audit log
//!
//! Registro durable de cada acción que cambia estado. El núcleo solo escribe;
//! nunca lee de vuelta.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::utils::errors::AppResult;

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        actor_id: Option<Uuid>,
        details: &serde_json::Value,
        notes: Option<&str>,
    ) -> AppResult<Uuid>;
}

pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        actor_id: Option<Uuid>,
        details: &serde_json::Value,
        notes: Option<&str>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, action, entity_type, entity_id, actor_id, details, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(actor_id)
        .bind(details)
        .bind(notes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}

/// Entrada guardada por `InMemoryAuditLog`
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit log en memoria para desarrollo local y tests
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        actor_id: Option<Uuid>,
        details: &serde_json::Value,
        notes: Option<&str>,
    ) -> AppResult<Uuid> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            actor_id,
            details: details.clone(),
            notes: notes.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = entry.id;
        self.entries.write().await.push(entry);
        Ok(id)
    }
}
