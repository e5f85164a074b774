//! In-memory mock implementations of the repository traits, for unit
//! testing the scheduler components without a database connection.
//!
//! The mock claim protocol mirrors the row-lock semantics closely enough
//! for state-machine tests: a claimed id cannot be claimed again until
//! released, and `find_executable` skips claimed rows the way
//! `FOR UPDATE SKIP LOCKED` hides locked ones.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use chronos_core::{SchedulerError, SchedulerResult};
use chronos_domain::{
    ClaimedTask, NewTask, SchedulerInstance, SchedulerRegistry, Task, TaskFilter, TaskRepository,
};

#[derive(Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<i64, Task>>>,
    claimed: Arc<Mutex<HashSet<i64>>>,
    completed: Arc<Mutex<Vec<i64>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Default::default()
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.tasks.lock().unwrap();
            let mut next_id = repo.next_id.lock().unwrap();
            for task in tasks {
                *next_id = (*next_id).max(task.id + 1);
                map.insert(task.id, task);
            }
        }
        repo
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.tasks.lock().unwrap().contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    /// Ids deleted through a successful `complete`, in completion order.
    pub fn completed_ids(&self) -> Vec<i64> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn ensure_schema(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn insert(&self, task: &NewTask) -> SchedulerResult<i64> {
        let mut tasks = self.tasks.lock().unwrap();

        let duplicate = tasks.values().any(|existing| {
            existing.namespace == task.namespace
                && existing.date == task.date
                && existing.name == task.name
        });
        if duplicate {
            return Err(SchedulerError::ConstraintViolation(format!(
                "duplicate key value violates unique constraint: ({}, {}, {})",
                task.namespace, task.date, task.name
            )));
        }

        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        tasks.insert(
            id,
            Task {
                id,
                namespace: task.namespace.clone(),
                date: task.date,
                name: task.name.clone(),
                data: task.data.clone(),
                category: task.category.clone(),
            },
        );
        Ok(id)
    }

    async fn list(&self, namespace: &str, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| t.namespace == namespace)
            .filter(|t| filter.id.is_none_or(|id| t.id == id))
            .filter(|t| filter.name.as_ref().is_none_or(|n| &t.name == n))
            .filter(|t| filter.category.as_ref().is_none_or(|c| t.category.as_ref() == Some(c)))
            .filter(|t| !filter.not_ids.contains(&t.id))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.date);
        Ok(matched)
    }

    async fn find_executable(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<Vec<Task>> {
        let now = Utc::now();
        let cutoff = now - Duration::milliseconds(max_task_age_ms);
        let claimed = self.claimed.lock().unwrap().clone();

        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| t.namespace == namespace)
            .filter(|t| t.date <= now && t.date > cutoff)
            .filter(|t| !claimed.contains(&t.id))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.date);
        Ok(matched)
    }

    async fn purge_outdated(
        &self,
        namespace: &str,
        max_task_age_ms: i64,
    ) -> SchedulerResult<u64> {
        let cutoff = Utc::now() - Duration::milliseconds(max_task_age_ms);
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, t| t.namespace != namespace || t.date >= cutoff);
        Ok((before - tasks.len()) as u64)
    }

    async fn claim(&self, id: i64) -> SchedulerResult<Option<Box<dyn ClaimedTask>>> {
        let task = match self.tasks.lock().unwrap().get(&id) {
            Some(task) => task.clone(),
            None => return Ok(None),
        };

        let mut claimed = self.claimed.lock().unwrap();
        if !claimed.insert(id) {
            return Ok(None);
        }
        drop(claimed);

        Ok(Some(Box::new(MockClaimedTask {
            task,
            tasks: Arc::clone(&self.tasks),
            claimed: Arc::clone(&self.claimed),
            completed: Arc::clone(&self.completed),
        })))
    }
}

pub struct MockClaimedTask {
    task: Task,
    tasks: Arc<Mutex<HashMap<i64, Task>>>,
    claimed: Arc<Mutex<HashSet<i64>>>,
    completed: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl ClaimedTask for MockClaimedTask {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn complete(self: Box<Self>) -> SchedulerResult<()> {
        self.tasks.lock().unwrap().remove(&self.task.id);
        self.claimed.lock().unwrap().remove(&self.task.id);
        self.completed.lock().unwrap().push(self.task.id);
        Ok(())
    }

    async fn release(self: Box<Self>) -> SchedulerResult<()> {
        self.claimed.lock().unwrap().remove(&self.task.id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockSchedulerRegistry {
    instances: Arc<Mutex<HashMap<i64, SchedulerInstance>>>,
    next_id: Arc<Mutex<i64>>,
    ping_count: Arc<Mutex<u64>>,
}

impl MockSchedulerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Default::default()
        }
    }

    pub fn ping_count(&self) -> u64 {
        *self.ping_count.lock().unwrap()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

#[async_trait]
impl SchedulerRegistry for MockSchedulerRegistry {
    async fn ensure_schema(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn register(&self) -> SchedulerResult<i64> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        let now = Utc::now();
        self.instances.lock().unwrap().insert(
            id,
            SchedulerInstance {
                id,
                registered_at: now,
                last_ping_at: now,
            },
        );
        Ok(id)
    }

    async fn ping(&self, scheduler_id: i64) -> SchedulerResult<()> {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(&scheduler_id) {
            instance.last_ping_at = Utc::now();
        }
        *self.ping_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn get(&self, scheduler_id: i64) -> SchedulerResult<Option<SchedulerInstance>> {
        Ok(self.instances.lock().unwrap().get(&scheduler_id).cloned())
    }
}
