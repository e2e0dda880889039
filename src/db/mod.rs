//! Database and store construction.
//!
//! Builds the configured [`Store`] backend: the in-memory store, or a
//! PostgreSQL store over an async diesel/bb8 pool.

mod migrations;
mod pool;

pub use migrations::{MIGRATIONS, pending_migrations, revert_migrations, run_pending_migrations};
pub use pool::{AsyncDbPool, establish_async_connection_pool};

use std::sync::Arc;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::AppResult;
use crate::store::{MemoryStore, PgStore, Schema, Store};

/// Relationship schema of the application's collections.
///
/// `users` has no relationships; new entities register theirs here.
pub fn app_schema() -> Schema {
    Schema::new()
}

/// Builds the store selected by `config.backend`.
///
/// For postgres, pending migrations run first when `auto_migrate` is set.
pub async fn build_store(config: &DatabaseConfig) -> AppResult<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new(app_schema())))
        }
        StoreBackend::Postgres => {
            if config.auto_migrate {
                let applied = run_pending_migrations(&config.url).await?;
                tracing::info!(count = applied.len(), migrations = ?applied, "Migrations applied");
            }
            let pool = establish_async_connection_pool(config).await?;
            tracing::info!(
                max_connections = config.max_connections,
                min_connections = config.min_connections,
                "Database connection pool initialized"
            );
            Ok(Arc::new(PgStore::new(pool, app_schema())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let store = build_store(&DatabaseConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await.is_ok());
        assert!(store.schema().relationships().is_empty());
    }
}
