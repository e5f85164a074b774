//! Data-access abstractions.
//!
//! The scheduler components depend on these traits rather than on a concrete
//! database client; the PostgreSQL implementations live in
//! `chronos-infrastructure`, the in-memory mocks in `chronos-testing-utils`.

use async_trait::async_trait;

use chronos_core::SchedulerResult;

use crate::entities::{NewTask, SchedulerInstance, Task, TaskFilter};

/// Durable task storage.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create the tasks table and its indexes if they do not exist.
    /// Safe to call repeatedly.
    async fn ensure_schema(&self) -> SchedulerResult<()>;

    /// Insert a validated task and return its generated id. A duplicate
    /// (namespace, date, name) surfaces as a `ConstraintViolation`.
    async fn insert(&self, task: &NewTask) -> SchedulerResult<i64>;

    /// General read scoped to one namespace, with optional filters.
    async fn list(&self, namespace: &str, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;

    /// Tasks that are due but still within the retention window, skipping
    /// rows currently locked by another in-flight transaction. This is the
    /// query that gives concurrent scheduler processes disjoint views of
    /// claimable work.
    async fn find_executable(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<Vec<Task>>;

    /// Delete rows whose target date fell out of the retention window.
    /// Rows that are merely overdue but within the window are untouched.
    /// Returns the number of rows removed.
    async fn purge_outdated(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<u64>;

    /// Open a transaction and re-select the row with a non-blocking lock.
    /// `None` means another transaction already holds the lock (or the row
    /// is gone) - the caller lost a benign race.
    async fn claim(&self, id: i64) -> SchedulerResult<Option<Box<dyn ClaimedTask>>>;
}

/// A task row locked inside an open transaction.
///
/// Exactly one of `complete` or `release` must consume the claim; dropping
/// it rolls the transaction back.
#[async_trait]
pub trait ClaimedTask: Send {
    fn task(&self) -> &Task;

    /// Delete the row and commit. The only path that removes an executed
    /// task.
    async fn complete(self: Box<Self>) -> SchedulerResult<()>;

    /// Roll back, leaving the row untouched for a future attempt.
    async fn release(self: Box<Self>) -> SchedulerResult<()>;
}

/// Liveness registry for distributed scheduler processes. Informational
/// only: execution mutual exclusion is arbitrated by row locks, never by
/// this table.
#[async_trait]
pub trait SchedulerRegistry: Send + Sync {
    async fn ensure_schema(&self) -> SchedulerResult<()>;

    /// Insert a liveness row for this process and return its generated id.
    async fn register(&self) -> SchedulerResult<i64>;

    /// Refresh `last_ping_at` for the given row.
    async fn ping(&self, scheduler_id: i64) -> SchedulerResult<()>;

    async fn get(&self, scheduler_id: i64) -> SchedulerResult<Option<SchedulerInstance>>;
}
