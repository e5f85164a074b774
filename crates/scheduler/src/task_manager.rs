use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use chronos_core::{SchedulerError, SchedulerResult};
use chronos_domain::{
    ClaimedTask, NewTask, Task, TaskFilter, TaskRepository, MAX_TASK_NAME_LEN,
};

use crate::handler_manager::HandlerRegistry;

const COMPONENT: &str = "TaskManager";

/// Caller-facing shape of a scheduling request; the namespace comes from
/// the owning manager.
#[derive(Debug, Clone)]
pub struct ScheduleTaskRequest {
    pub date: DateTime<Utc>,
    pub name: String,
    pub data: String,
    pub category: Option<String>,
}

/// Owns the durable task table for one namespace: validates and inserts
/// scheduled work, and exposes the locked queries the execution loops use.
pub struct TaskManager {
    repository: Arc<dyn TaskRepository>,
    namespace: String,
    clear_outdated_tasks: bool,
    max_task_age_ms: i64,
    initialized: AtomicBool,
}

impl TaskManager {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        namespace: impl Into<String>,
        clear_outdated_tasks: bool,
        max_task_age_ms: i64,
    ) -> Self {
        Self {
            repository,
            namespace: namespace.into(),
            clear_outdated_tasks,
            max_task_age_ms,
            initialized: AtomicBool::new(false),
        }
    }

    /// Idempotent. Bootstraps the schema and, when configured, deletes rows
    /// whose target date fell out of the retention window - work that can
    /// never legitimately execute anymore. Rows that are merely overdue but
    /// within the window stay.
    pub async fn init(&self) -> SchedulerResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.repository.ensure_schema().await?;

        if self.clear_outdated_tasks {
            let removed = self
                .repository
                .purge_outdated(&self.namespace, self.max_task_age_ms)
                .await?;
            if removed > 0 {
                info!(removed, "cleared tasks past the retention window");
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn ensure_initialized(&self) -> SchedulerResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::not_initialized(COMPONENT))
        }
    }

    /// Validate and durably insert a scheduling request, returning the
    /// generated task id. Validation short-circuits on the first failure:
    /// registry initialized, date strictly future, handler registered, name
    /// within the schema limit. A concurrent duplicate of
    /// (namespace, date, name) surfaces as `ConstraintViolation`.
    pub async fn schedule_task(
        &self,
        request: ScheduleTaskRequest,
        registry: &dyn HandlerRegistry,
    ) -> SchedulerResult<i64> {
        self.ensure_initialized()?;

        if !registry.is_initialized() {
            return Err(SchedulerError::not_initialized("HandlerManager"));
        }

        let now = Utc::now();
        if request.date <= now {
            return Err(SchedulerError::InvalidDate {
                date: request.date.to_rfc3339(),
            });
        }

        if !registry.contains(&request.name)? {
            return Err(SchedulerError::no_registered_handler(request.name));
        }

        if request.name.chars().count() > MAX_TASK_NAME_LEN {
            return Err(SchedulerError::ConstraintViolation(format!(
                "task name exceeds {MAX_TASK_NAME_LEN} characters"
            )));
        }

        let id = self
            .repository
            .insert(&NewTask {
                namespace: self.namespace.clone(),
                date: request.date,
                name: request.name,
                data: request.data,
                category: request.category,
            })
            .await?;

        debug!(task_id = id, "scheduled task");
        Ok(id)
    }

    /// Tasks due now and still within the retention window, skipping rows
    /// locked by another in-flight transaction. Concurrent callers get
    /// disjoint views of claimable work.
    pub async fn get_executable_tasks(&self) -> SchedulerResult<Vec<Task>> {
        self.ensure_initialized()?;
        self.repository
            .find_executable(&self.namespace, self.max_task_age_ms)
            .await
    }

    /// General namespace-scoped read. The realtime loop passes its pending
    /// ids through `filter.not_ids` to skip tasks it already claimed.
    pub async fn get_tasks(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.ensure_initialized()?;
        self.repository.list(&self.namespace, filter).await
    }

    /// Lock the row for execution. Used only by the execution protocol;
    /// there is no standalone cancel operation on this surface.
    pub(crate) async fn claim(&self, id: i64) -> SchedulerResult<Option<Box<dyn ClaimedTask>>> {
        self.ensure_initialized()?;
        self.repository.claim(id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chronos_testing_utils::{MockTaskRepository, NewTaskBuilder, TaskBuilder};

    use super::*;
    use crate::handler::handler_fn;
    use crate::handler_manager::HandlerManager;

    fn manager_with(repo: &MockTaskRepository) -> TaskManager {
        TaskManager::new(Arc::new(repo.clone()), "test", false, 999_999_999)
    }

    fn registry_with(names: &[&str]) -> HandlerManager {
        let registry = HandlerManager::new();
        registry.init();
        for name in names {
            registry
                .register_task_handler(*name, handler_fn(|_p: String| async move { Ok(()) }))
                .unwrap();
        }
        registry
    }

    fn future_request(name: &str) -> ScheduleTaskRequest {
        ScheduleTaskRequest {
            date: Utc::now() + Duration::days(1),
            name: name.to_string(),
            data: "{}".to_string(),
            category: None,
        }
    }

    #[tokio::test]
    async fn schedule_fails_if_manager_not_initialized() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        let registry = registry_with(&["test"]);

        let result = manager.schedule_task(future_request("test"), &registry).await;
        assert!(matches!(
            result,
            Err(SchedulerError::NotInitialized {
                component: "TaskManager"
            })
        ));
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn schedule_fails_if_registry_not_initialized() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let registry = HandlerManager::new();

        let result = manager.schedule_task(future_request("test"), &registry).await;
        assert!(matches!(
            result,
            Err(SchedulerError::NotInitialized {
                component: "HandlerManager"
            })
        ));
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn schedule_rejects_past_dates() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let registry = registry_with(&["test"]);

        let request = ScheduleTaskRequest {
            date: Utc::now() - Duration::days(1),
            ..future_request("test")
        };
        let result = manager.schedule_task(request, &registry).await;
        assert!(matches!(result, Err(SchedulerError::InvalidDate { .. })));
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn schedule_rejects_unregistered_handler() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let registry = registry_with(&[]);

        let result = manager.schedule_task(future_request("test"), &registry).await;
        assert!(
            matches!(result, Err(SchedulerError::NoRegisteredHandler { name }) if name == "test")
        );
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn schedule_rejects_overlong_names() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let long_name = "a".repeat(256);
        let registry = registry_with(&[long_name.as_str()]);

        let result = manager
            .schedule_task(future_request(&long_name), &registry)
            .await;
        assert!(matches!(
            result,
            Err(SchedulerError::ConstraintViolation(_))
        ));
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn schedule_inserts_and_returns_id() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let registry = registry_with(&["test"]);

        let id = manager
            .schedule_task(future_request("test"), &registry)
            .await
            .unwrap();

        assert_eq!(repo.count(), 1);
        let stored = repo.get(id).unwrap();
        assert_eq!(stored.namespace, "test");
        assert_eq!(stored.name, "test");
    }

    #[tokio::test]
    async fn schedule_surfaces_duplicate_as_constraint_violation() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();
        let registry = registry_with(&["test"]);

        let request = future_request("test");
        manager
            .schedule_task(request.clone(), &registry)
            .await
            .unwrap();
        let result = manager.schedule_task(request, &registry).await;

        assert!(matches!(
            result,
            Err(SchedulerError::ConstraintViolation(_))
        ));
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn init_purges_only_rows_past_the_window() {
        let repo = MockTaskRepository::with_tasks(vec![
            TaskBuilder::new()
                .with_id(1)
                .due_in(Duration::days(-1))
                .with_name("old")
                .build(),
            TaskBuilder::new()
                .with_id(2)
                .due_in(Duration::days(1))
                .with_name("future")
                .build(),
        ]);
        // One-minute retention window.
        let manager = TaskManager::new(Arc::new(repo.clone()), "test", true, 60_000);
        manager.init().await.unwrap();

        assert!(!repo.contains(1));
        assert!(repo.contains(2));
    }

    #[tokio::test]
    async fn init_without_clear_flag_keeps_outdated_rows() {
        let repo = MockTaskRepository::with_tasks(vec![TaskBuilder::new()
            .with_id(1)
            .due_in(Duration::days(-30))
            .build()]);
        let manager = TaskManager::new(Arc::new(repo.clone()), "test", false, 60_000);
        manager.init().await.unwrap();

        assert!(repo.contains(1));
    }

    #[tokio::test]
    async fn executable_tasks_exclude_future_and_stale_rows() {
        let repo = MockTaskRepository::with_tasks(vec![
            TaskBuilder::new()
                .with_id(1)
                .due_in(Duration::seconds(-5))
                .with_name("due")
                .build(),
            TaskBuilder::new()
                .with_id(2)
                .due_in(Duration::hours(1))
                .with_name("future")
                .build(),
            TaskBuilder::new()
                .with_id(3)
                .due_in(Duration::days(-2))
                .with_name("stale")
                .build(),
        ]);
        let manager = TaskManager::new(Arc::new(repo.clone()), "test", false, 3_600_000);
        manager.init().await.unwrap();

        let executable = manager.get_executable_tasks().await.unwrap();
        assert_eq!(executable.len(), 1);
        assert_eq!(executable[0].id, 1);
    }

    #[tokio::test]
    async fn get_tasks_applies_not_ids_filter() {
        let repo = MockTaskRepository::new();
        let manager = manager_with(&repo);
        manager.init().await.unwrap();

        for name in ["a", "b", "c"] {
            repo.insert(&NewTaskBuilder::new().with_name(name).build())
                .await
                .unwrap();
        }

        let filter = TaskFilter {
            not_ids: vec![2],
            ..Default::default()
        };
        let tasks = manager.get_tasks(&filter).await.unwrap();
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
