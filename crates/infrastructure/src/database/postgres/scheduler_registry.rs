use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use chronos_core::SchedulerResult;
use chronos_domain::{SchedulerInstance, SchedulerRegistry};

const CREATE_SCHEDULERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schedulers (
        id BIGSERIAL PRIMARY KEY,
        registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_ping_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

pub struct PostgresSchedulerRegistry {
    pool: PgPool,
}

impl PostgresSchedulerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulerRegistry for PostgresSchedulerRegistry {
    async fn ensure_schema(&self) -> SchedulerResult<()> {
        sqlx::query(CREATE_SCHEDULERS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn register(&self) -> SchedulerResult<i64> {
        let row = sqlx::query(
            "INSERT INTO schedulers (registered_at, last_ping_at) \
             VALUES (NOW(), NOW()) RETURNING id",
        )
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(scheduler_id = id, "registered scheduler instance");
        Ok(id)
    }

    async fn ping(&self, scheduler_id: i64) -> SchedulerResult<()> {
        sqlx::query("UPDATE schedulers SET last_ping_at = NOW() WHERE id = $1")
            .bind(scheduler_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, scheduler_id: i64) -> SchedulerResult<Option<SchedulerInstance>> {
        let row = sqlx::query(
            "SELECT id, registered_at, last_ping_at FROM schedulers WHERE id = $1",
        )
        .bind(scheduler_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(SchedulerInstance {
                id: row.try_get("id")?,
                registered_at: row.try_get("registered_at")?,
                last_ping_at: row.try_get("last_ping_at")?,
            })
        })
        .transpose()
    }
}
