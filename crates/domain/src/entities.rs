use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest task name the schema accepts (`name VARCHAR(255)`).
pub const MAX_TASK_NAME_LEN: usize = 255;

/// A durable unit of deferred work.
///
/// A task has no status column: it either exists (pending) or has been
/// deleted by a successful execution. It is never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    /// Partition key isolating schedulers that share one database.
    pub namespace: String,
    /// Target execution time.
    pub date: DateTime<Utc>,
    /// Handler key; which registered callback consumes this task.
    pub name: String,
    /// Opaque serialized payload handed to the handler verbatim.
    pub data: String,
    pub category: Option<String>,
}

impl Task {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.date <= now
    }
}

/// Insert shape for a task row; the id is generated by the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub namespace: String,
    pub date: DateTime<Utc>,
    pub name: String,
    pub data: String,
    pub category: Option<String>,
}

/// Optional filters for general task reads.
///
/// `not_ids` exists for the realtime loop: it excludes tasks the loop has
/// already claimed with an in-process timer.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub not_ids: Vec<i64>,
}

/// Liveness row written by a distributed scheduler process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerInstance {
    pub id: i64,
    pub registered_at: DateTime<Utc>,
    pub last_ping_at: DateTime<Utc>,
}

/// Result of one pass through the execution protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Handler succeeded; the row was deleted and the transaction committed.
    Completed,
    /// Another transaction held the row lock, or the row was already gone.
    /// A benign race, not an error.
    AlreadyClaimed,
    /// Handler failed; the transaction rolled back and the row persists for
    /// a future attempt.
    HandlerFailed,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn task_at(date: DateTime<Utc>) -> Task {
        Task {
            id: 1,
            namespace: "test".into(),
            date,
            name: "demo".into(),
            data: "{}".into(),
            category: None,
        }
    }

    #[test]
    fn task_due_at_or_before_now() {
        let now = Utc::now();
        assert!(task_at(now).is_due(now));
        assert!(task_at(now - Duration::seconds(1)).is_due(now));
        assert!(!task_at(now + Duration::seconds(1)).is_due(now));
    }
}
