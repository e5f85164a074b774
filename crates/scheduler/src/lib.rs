pub mod handler;
pub mod handler_manager;
pub mod heartbeat;
pub mod pending;
pub mod scheduler;
pub mod task_manager;

pub use handler::{handler_fn, TaskHandler};
pub use handler_manager::{HandlerManager, HandlerRegistry};
pub use heartbeat::HeartbeatCoordinator;
pub use pending::PendingTimers;
pub use scheduler::Scheduler;
pub use task_manager::{ScheduleTaskRequest, TaskManager};
