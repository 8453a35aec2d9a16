//! Repositorios
//!
//! Acceso a datos detrás de traits, con implementación PostgreSQL y
//! en memoria.

pub mod transport_store;
pub mod postgres_store;
pub mod memory_store;
pub mod audit_repository;

pub use transport_store::TransportStore;
pub use postgres_store::PostgresStore;
pub use memory_store::{InMemoryStore, StoreCollection};
pub use audit_repository::{AuditLog, InMemoryAuditLog, PostgresAuditLog};
