//! Test-data builders with sensible defaults.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use chronos_domain::{NewTask, Task};

/// Namespace unique to one test, so tests sharing a database never see each
/// other's rows.
pub fn unique_namespace(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task {
                id: 1,
                namespace: "test".to_string(),
                date: Utc::now() + Duration::hours(1),
                name: "test_task".to_string(),
                data: "{}".to_string(),
                category: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.task.namespace = namespace.to_string();
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.task.date = date;
        self
    }

    /// Target time relative to now; negative offsets build overdue tasks.
    pub fn due_in(mut self, offset: Duration) -> Self {
        self.task.date = Utc::now() + offset;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_data(mut self, data: &str) -> Self {
        self.task.data = data.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.task.category = Some(category.to_string());
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NewTaskBuilder {
    task: NewTask,
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            task: NewTask {
                namespace: "test".to_string(),
                date: Utc::now() + Duration::hours(1),
                name: "test_task".to_string(),
                data: "{}".to_string(),
                category: None,
            },
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.task.namespace = namespace.to_string();
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.task.date = date;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_data(mut self, data: &str) -> Self {
        self.task.data = data.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.task.category = Some(category.to_string());
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
