use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use chronos_core::{ExecutionMode, SchedulerConfig, SchedulerError, SchedulerResult};
use chronos_domain::{ExecutionOutcome, SchedulerRegistry, Task, TaskFilter, TaskRepository};
use chronos_infrastructure::{DatabaseManager, PostgresSchedulerRegistry, PostgresTaskRepository};

use crate::handler::TaskHandler;
use crate::handler_manager::HandlerManager;
use crate::heartbeat::HeartbeatCoordinator;
use crate::pending::PendingTimers;
use crate::task_manager::{ScheduleTaskRequest, TaskManager};

const COMPONENT: &str = "Scheduler";

/// Composes the handler registry and the task manager and drives execution:
/// either one deliberate poll-and-execute pass (single mode) or a continuous
/// hybrid poll+timer loop (realtime mode). Owns the connection pool and all
/// polling/heartbeat intervals.
///
/// Lifecycle: Uninitialized -> Initialized -> Started <-> Stopped. Every
/// public operation other than `init` fails with `NotInitialized` first.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    execution_mode: ExecutionMode,
    handle_interval: Duration,
    handler_manager: HandlerManager,
    task_manager: TaskManager,
    pending: PendingTimers,
    heartbeat: Option<HeartbeatCoordinator>,
    database: Option<DatabaseManager>,
    initialized: AtomicBool,
    started: AtomicBool,
    poll_shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    /// Build a PostgreSQL-backed scheduler. The pool is constructed lazily;
    /// the first connection is opened by `init`.
    pub fn connect(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;

        let database = DatabaseManager::connect_lazy(&config.database)?;
        let task_repository: Arc<dyn TaskRepository> =
            Arc::new(PostgresTaskRepository::new(database.pool().clone()));
        let scheduler_registry: Option<Arc<dyn SchedulerRegistry>> = if config.distributed {
            Some(Arc::new(PostgresSchedulerRegistry::new(
                database.pool().clone(),
            )))
        } else {
            None
        };

        Ok(Self::assemble(
            config,
            task_repository,
            scheduler_registry,
            Some(database),
        ))
    }

    /// Assemble from injected repository implementations. Used by tests and
    /// by embedders bringing their own storage.
    pub fn with_store(
        config: SchedulerConfig,
        task_repository: Arc<dyn TaskRepository>,
        scheduler_registry: Option<Arc<dyn SchedulerRegistry>>,
    ) -> Self {
        Self::assemble(config, task_repository, scheduler_registry, None)
    }

    fn assemble(
        config: SchedulerConfig,
        task_repository: Arc<dyn TaskRepository>,
        scheduler_registry: Option<Arc<dyn SchedulerRegistry>>,
        database: Option<DatabaseManager>,
    ) -> Self {
        let heartbeat = scheduler_registry
            .map(|registry| HeartbeatCoordinator::new(registry, config.ping_interval_ms));

        Self {
            inner: Arc::new(SchedulerInner {
                execution_mode: config.execution_mode,
                handle_interval: Duration::from_millis(config.handle_interval_ms),
                handler_manager: HandlerManager::new(),
                task_manager: TaskManager::new(
                    task_repository,
                    config.namespace,
                    config.clear_outdated_tasks,
                    config.max_task_age_ms,
                ),
                pending: PendingTimers::new(),
                heartbeat,
                database,
                initialized: AtomicBool::new(false),
                started: AtomicBool::new(false),
                poll_shutdown: Mutex::new(None),
            }),
        }
    }

    /// Idempotent. Initializes the handler registry before the task manager
    /// (scheduling validation reads the registry), then the optional
    /// heartbeat coordinator.
    pub async fn init(&self) -> SchedulerResult<()> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(database) = &self.inner.database {
            database.health_check().await?;
        }

        self.inner.handler_manager.init();
        self.inner.task_manager.init().await?;

        if let Some(heartbeat) = &self.inner.heartbeat {
            heartbeat.init().await?;
        }

        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(namespace = %self.inner.task_manager.namespace(), "scheduler initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn namespace(&self) -> &str {
        self.inner.task_manager.namespace()
    }

    /// Liveness row id, when running distributed and initialized.
    pub fn scheduler_id(&self) -> Option<i64> {
        self.inner
            .heartbeat
            .as_ref()
            .and_then(|heartbeat| heartbeat.scheduler_id())
    }

    pub fn register_task_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> SchedulerResult<bool> {
        self.inner.handler_manager.register_task_handler(name, handler)
    }

    pub fn remove_task_handler(&self, name: &str) -> SchedulerResult<bool> {
        self.inner.handler_manager.remove_task_handler(name)
    }

    /// Validate and durably schedule work for a future time; returns the
    /// generated task id.
    pub async fn schedule_task(
        &self,
        date: chrono::DateTime<Utc>,
        name: impl Into<String>,
        data: impl Into<String>,
        category: Option<String>,
    ) -> SchedulerResult<i64> {
        self.inner
            .task_manager
            .schedule_task(
                ScheduleTaskRequest {
                    date,
                    name: name.into(),
                    data: data.into(),
                    category,
                },
                &self.inner.handler_manager,
            )
            .await
    }

    /// Dispatch per the configured execution mode and mark Started. Returns
    /// `false` without doing anything if already started.
    pub async fn start(&self) -> SchedulerResult<bool> {
        if self.inner.started.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.ensure_initialized()?;

        match self.inner.execution_mode {
            ExecutionMode::Single => Arc::clone(&self.inner).single_execution().await?,
            ExecutionMode::Realtime => Arc::clone(&self.inner).start_realtime_execution().await?,
        }

        self.inner.started.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// Cancel the polling interval. Meaningful only in realtime mode while
    /// started; returns `false` otherwise. Per-task timers that are already
    /// armed are deliberately left running: they still fire and execute
    /// after a stop (cancelling one without releasing its pending id would
    /// hide the task from every later poll).
    pub fn stop(&self) -> bool {
        if self.inner.execution_mode == ExecutionMode::Single
            || !self.inner.started.load(Ordering::SeqCst)
        {
            return false;
        }

        self.inner.stop_poll_loop();
        self.inner.started.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
        true
    }

    /// Tear down the polling and heartbeat intervals and close the pool.
    /// The instance is unusable afterwards; every operation fails with
    /// `NotInitialized`.
    pub async fn destroy(&self) -> SchedulerResult<()> {
        self.inner.ensure_initialized()?;

        self.inner.initialized.store(false, Ordering::SeqCst);
        self.inner.started.store(false, Ordering::SeqCst);
        self.inner.stop_poll_loop();

        if let Some(heartbeat) = &self.inner.heartbeat {
            heartbeat.stop();
        }
        if let Some(database) = &self.inner.database {
            database.close().await;
        }

        info!("scheduler destroyed");
        Ok(())
    }

    /// Run the shared execution protocol for one task. Exposed for callers
    /// that drive execution externally; both loops go through the same path.
    pub async fn execute_task(
        &self,
        task: &Task,
        handler: Arc<dyn TaskHandler>,
    ) -> SchedulerResult<ExecutionOutcome> {
        self.inner.execute_task(task, handler).await
    }
}

impl SchedulerInner {
    fn ensure_initialized(&self) -> SchedulerResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::not_initialized(COMPONENT))
        }
    }

    fn stop_poll_loop(&self) {
        if let Some(tx) = self.poll_shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }

    /// One deliberate poll-and-execute pass: fetch everything claimable,
    /// run all of it concurrently, await the whole batch.
    async fn single_execution(self: Arc<Self>) -> SchedulerResult<()> {
        let tasks = self.task_manager.get_executable_tasks().await?;
        let handlers = self.handler_manager.task_handlers()?;
        debug!(count = tasks.len(), "fetched executable tasks");

        let mut executions = Vec::new();
        for task in tasks {
            let Some(handler) = handlers.get(&task.name).cloned() else {
                warn!(task_id = task.id, name = %task.name, "no handler registered for task");
                continue;
            };

            let inner = Arc::clone(&self);
            executions.push(async move {
                if let Err(e) = inner.execute_task(&task, handler).await {
                    error!(task_id = task.id, error = %e, "task execution failed");
                }
            });
        }

        join_all(executions).await;
        Ok(())
    }

    /// Run the first pass inline (so a broken fetch surfaces in `start`),
    /// then poll on the configured interval until stopped.
    async fn start_realtime_execution(self: Arc<Self>) -> SchedulerResult<()> {
        Arc::clone(&self).realtime_pass().await?;

        let (tx, mut rx) = watch::channel(false);
        *self.poll_shutdown.lock().unwrap() = Some(tx);

        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + inner.handle_interval,
                inner.handle_interval,
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Arc::clone(&inner).realtime_pass().await {
                            error!(error = %e, "realtime poll failed");
                        }
                    }
                    _ = rx.changed() => {
                        debug!("polling loop cancelled");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// One cycle of the hybrid poll+timer algorithm: fetch tasks not yet
    /// claimed by an in-process timer, arm a one-shot timer for each future
    /// task, and execute everything already due right away.
    async fn realtime_pass(self: Arc<Self>) -> SchedulerResult<()> {
        let filter = TaskFilter {
            not_ids: self.pending.snapshot(),
            ..Default::default()
        };
        let tasks = self.task_manager.get_tasks(&filter).await?;
        let handlers = self.handler_manager.task_handlers()?;
        debug!(count = tasks.len(), pending = self.pending.len(), "realtime poll");

        for task in tasks {
            let Some(handler) = handlers.get(&task.name).cloned() else {
                warn!(task_id = task.id, name = %task.name, "no handler registered for task");
                continue;
            };

            let now = Utc::now();
            if !task.is_due(now) {
                if !self.pending.claim(task.id) {
                    continue;
                }
                let delay = (task.date - now).to_std().unwrap_or(Duration::ZERO);
                debug!(task_id = task.id, delay_ms = delay.as_millis() as u64, "arming task timer");

                // Detached on purpose: stop() cancels only the polling
                // interval, never an armed timer. The timer callback is the
                // sole owner of this pending claim (see PendingTimers).
                let inner = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.pending.release(task.id);
                    if let Err(e) = inner.execute_task(&task, handler).await {
                        error!(task_id = task.id, error = %e, "task execution failed");
                    }
                });
            } else {
                // Catches ids stranded by a timer that never ran; without
                // this a stranded id would suppress the task forever.
                self.pending.release(task.id);
                debug!(task_id = task.id, "executing overdue task immediately");

                let inner = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = inner.execute_task(&task, handler).await {
                        error!(task_id = task.id, error = %e, "task execution failed");
                    }
                });
            }
        }

        Ok(())
    }

    /// The shared execution protocol, the only path that removes a task
    /// row: re-select under a non-blocking row lock, invoke the handler,
    /// then delete-and-commit on success or roll back on failure. Losing
    /// the lock race is a benign outcome, not an error.
    async fn execute_task(
        &self,
        task: &Task,
        handler: Arc<dyn TaskHandler>,
    ) -> SchedulerResult<ExecutionOutcome> {
        self.ensure_initialized()?;
        debug!(task_id = task.id, "executing task");

        let Some(claim) = self.task_manager.claim(task.id).await? else {
            info!(task_id = task.id, "task is already locked");
            return Ok(ExecutionOutcome::AlreadyClaimed);
        };

        match handler.handle(&claim.task().data).await {
            Ok(()) => {
                claim.complete().await?;
                debug!(task_id = task.id, "task executed and removed");
                Ok(ExecutionOutcome::Completed)
            }
            Err(e) => {
                // The row survives untouched for a later attempt; there is
                // no retry counter or backoff.
                error!(task_id = task.id, error = %e, "handler failed, task retained");
                claim.release().await?;
                Ok(ExecutionOutcome::HandlerFailed)
            }
        }
    }
}
