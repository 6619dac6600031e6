//! PostgreSQL connection pool.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::AppConfig;
use crate::dependency::handle::{Dependency, Handle, HandleError, OpenError};

/// Opens the `database` section of the configuration as a [`PgPool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseDependency;

#[async_trait]
impl Dependency for DatabaseDependency {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn open(&self, config: &AppConfig) -> Result<Arc<dyn Handle>, OpenError> {
        let db = &config.database;
        let timeout = db.connect_timeout();

        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(timeout)
            .connect(&db.url)
            .await
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut => OpenError::Timeout(timeout),
                sqlx::Error::Configuration(e) => OpenError::InvalidParams(e.to_string()),
                other => OpenError::connect(other),
            })?;

        let handle = DatabaseHandle { pool };
        if let Err(e) = handle.ping().await {
            handle.pool.close().await;
            return Err(OpenError::NotReady(e.to_string()));
        }

        tracing::debug!(max_connections = db.max_connections, "Database pool connected");
        Ok(Arc::new(handle))
    }
}

/// An open PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct DatabaseHandle {
    pool: PgPool,
}

impl DatabaseHandle {
    /// The underlying pool, for request handlers.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Handle for DatabaseHandle {
    fn name(&self) -> &str {
        "database"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn ping(&self) -> Result<(), HandleError> {
        if self.pool.is_closed() {
            return Err(HandleError::Closed);
        }
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(HandleError::backend)
    }

    async fn close(&self) -> Result<(), HandleError> {
        if self.pool.is_closed() {
            return Err(HandleError::Closed);
        }
        self.pool.close().await;
        Ok(())
    }
}
