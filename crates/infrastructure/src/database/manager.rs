use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use chronos_core::{DatabaseConfig, SchedulerResult};

/// Owns the connection pool for one scheduler instance.
///
/// The pool size doubles as the execution concurrency limit: every task
/// execution holds one pooled connection for the lifetime of its
/// transaction, so at most `max_connections` executions run at once.
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Build the pool without opening a connection; the first query
    /// connects. Lets `Scheduler::connect` stay synchronous-cheap and
    /// defers network failures to `init`.
    pub fn connect_lazy(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_lazy(&config.url)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
