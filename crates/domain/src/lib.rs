pub mod entities;
pub mod repositories;
pub mod task_query_builder;

pub use entities::*;
pub use repositories::*;
pub use chronos_core::{SchedulerError, SchedulerResult};
