use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use chronos_core::SchedulerResult;
use chronos_domain::task_query_builder::{TaskQueryBuilder, TaskQueryParam};
use chronos_domain::{ClaimedTask, NewTask, Task, TaskFilter, TaskRepository};

const CREATE_TASKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BIGSERIAL PRIMARY KEY,
        namespace TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL,
        name VARCHAR(255) NOT NULL,
        data TEXT NOT NULL,
        category VARCHAR(255),
        UNIQUE (namespace, date, name)
    )
"#;

const CREATE_TASKS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_namespace_date ON tasks (namespace, date)";

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &PgRow) -> SchedulerResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            namespace: row.try_get("namespace")?,
            date: row.try_get("date")?,
            name: row.try_get("name")?,
            data: row.try_get("data")?,
            category: row.try_get("category")?,
        })
    }

    fn bind_query_params<'q>(
        mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        params: &'q [TaskQueryParam],
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        for param in params {
            query = match param {
                TaskQueryParam::Text(value) => query.bind(value.as_str()),
                TaskQueryParam::Int64(value) => query.bind(*value),
                TaskQueryParam::Int64Array(values) => query.bind(values.as_slice()),
            };
        }
        query
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn ensure_schema(&self) -> SchedulerResult<()> {
        sqlx::query(CREATE_TASKS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_TASKS_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_name = %task.name, namespace = %task.namespace))]
    async fn insert(&self, task: &NewTask) -> SchedulerResult<i64> {
        let row = sqlx::query(
            "INSERT INTO tasks (namespace, date, name, data, category) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&task.namespace)
        .bind(task.date)
        .bind(&task.name)
        .bind(&task.data)
        .bind(&task.category)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(task_id = id, "inserted task");
        Ok(id)
    }

    #[instrument(skip(self, filter), fields(namespace = %namespace))]
    async fn list(&self, namespace: &str, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let (query, params) = TaskQueryBuilder::build_list_query(namespace, filter);

        let rows = Self::bind_query_params(sqlx::query(&query), &params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self), fields(namespace = %namespace))]
    async fn find_executable(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<Vec<Task>> {
        let query = TaskQueryBuilder::build_executable_query();

        // The lock clause only filters rows locked elsewhere; nothing stays
        // locked past this statement's implicit transaction.
        let rows = sqlx::query(&query)
            .bind(namespace)
            .bind(max_task_age_ms)
            .fetch_all(&self.pool)
            .await?;

        let tasks: SchedulerResult<Vec<Task>> = rows.iter().map(Self::row_to_task).collect();
        let tasks = tasks?;
        debug!(count = tasks.len(), "fetched executable tasks");
        Ok(tasks)
    }

    #[instrument(skip(self), fields(namespace = %namespace))]
    async fn purge_outdated(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<u64> {
        let result = sqlx::query(&TaskQueryBuilder::build_purge_query())
            .bind(namespace)
            .bind(max_task_age_ms)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn claim(&self, id: i64) -> SchedulerResult<Option<Box<dyn ClaimedTask>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&TaskQueryBuilder::build_claim_query())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let task = Self::row_to_task(&row)?;
                Ok(Some(Box::new(PostgresClaimedTask { task, tx })))
            }
            None => {
                debug!(task_id = id, "task already locked or gone");
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}

/// A row held under `FOR UPDATE` inside an open transaction. The claim pins
/// one pooled connection until completed or released.
pub struct PostgresClaimedTask {
    task: Task,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ClaimedTask for PostgresClaimedTask {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn complete(self: Box<Self>) -> SchedulerResult<()> {
        let Self { task, mut tx } = *self;

        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(task_id = task.id, "task completed and removed");
        Ok(())
    }

    async fn release(self: Box<Self>) -> SchedulerResult<()> {
        let Self { task, tx } = *self;

        tx.rollback().await?;

        debug!(task_id = task.id, "task claim released");
        Ok(())
    }
}
