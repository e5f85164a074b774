pub mod config;
pub mod errors;
pub mod logging;

pub use config::{DatabaseConfig, ExecutionMode, SchedulerConfig};
pub use errors::{SchedulerError, SchedulerResult};
