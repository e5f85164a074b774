use thiserror::Error;

/// Postgres SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },
    #[error("scheduled date must be strictly in the future: {date}")]
    InvalidDate { date: String },
    #[error("no handler registered for task name '{name}'")]
    NoRegisteredHandler { name: String },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("handler for task {task_id} failed: {message}")]
    HandlerExecutionFailure { task_id: i64, message: String },
    #[error("database operation failed: {0}")]
    DatabaseOperation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn not_initialized(component: &'static str) -> Self {
        Self::NotInitialized { component }
    }

    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn no_registered_handler<S: Into<String>>(name: S) -> Self {
        Self::NoRegisteredHandler { name: name.into() }
    }

    /// True for the benign races and contained failures that the execution
    /// loops log and move past instead of propagating.
    pub fn is_contained(&self) -> bool {
        matches!(self, SchedulerError::HandlerExecutionFailure { .. })
    }
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return SchedulerError::ConstraintViolation(db.message().to_string());
            }
        }
        SchedulerError::DatabaseOperation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_initialized_names_the_component() {
        let err = SchedulerError::not_initialized("HandlerManager");
        assert_eq!(err.to_string(), "HandlerManager is not initialized");
    }

    #[test]
    fn no_registered_handler_names_the_task() {
        let err = SchedulerError::no_registered_handler("send-email");
        assert!(err.to_string().contains("send-email"));
    }

    #[test]
    fn handler_failure_is_contained() {
        let err = SchedulerError::HandlerExecutionFailure {
            task_id: 7,
            message: "boom".into(),
        };
        assert!(err.is_contained());
        assert!(!SchedulerError::database_error("down").is_contained());
    }

    #[test]
    fn row_not_found_maps_to_database_operation() {
        let err: SchedulerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, SchedulerError::DatabaseOperation(_)));
    }
}
