pub mod scheduler_registry;
pub mod task_repository;

pub use scheduler_registry::PostgresSchedulerRegistry;
pub use task_repository::PostgresTaskRepository;
