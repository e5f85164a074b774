//! Durable PostgreSQL-backed task scheduler.
//!
//! Callers register named handlers, schedule work for a future time, and the
//! scheduler guarantees at-most-one successful execution per task - even when
//! several scheduler processes share one database. Cross-process mutual
//! exclusion comes from `FOR UPDATE SKIP LOCKED` row locking; on-time firing
//! in realtime mode comes from a hybrid poll+timer loop.
//!
//! ```no_run
//! use chronos::{handler_fn, ExecutionMode, Scheduler, SchedulerConfig};
//!
//! # async fn run() -> chronos::SchedulerResult<()> {
//! let config = SchedulerConfig {
//!     namespace: "billing".into(),
//!     execution_mode: ExecutionMode::Realtime,
//!     ..Default::default()
//! };
//!
//! let scheduler = Scheduler::connect(config)?;
//! scheduler.init().await?;
//!
//! scheduler.register_task_handler(
//!     "send-invoice",
//!     handler_fn(|payload: String| async move {
//!         println!("sending invoice: {payload}");
//!         Ok(())
//!     }),
//! )?;
//!
//! let due = chrono::Utc::now() + chrono::Duration::minutes(5);
//! scheduler.schedule_task(due, "send-invoice", "{\"invoice\":42}", None).await?;
//!
//! scheduler.start().await?;
//! # Ok(())
//! # }
//! ```

pub use chronos_core::{
    logging::init_tracing, DatabaseConfig, ExecutionMode, SchedulerConfig, SchedulerError,
    SchedulerResult,
};
pub use chronos_domain::{
    ExecutionOutcome, NewTask, SchedulerInstance, Task, TaskFilter, MAX_TASK_NAME_LEN,
};
pub use chronos_domain::{ClaimedTask, SchedulerRegistry, TaskRepository};
pub use chronos_infrastructure::{
    DatabaseManager, PostgresSchedulerRegistry, PostgresTaskRepository,
};
pub use chronos_scheduler::{
    handler_fn, HandlerManager, HandlerRegistry, HeartbeatCoordinator, PendingTimers, Scheduler,
    ScheduleTaskRequest, TaskHandler, TaskManager,
};
