//! Shared test support: in-memory mocks for the repository traits,
//! test-data builders, and a containerized PostgreSQL fixture.

pub mod builders;
pub mod containers;
pub mod mocks;

pub use builders::{unique_namespace, NewTaskBuilder, TaskBuilder};
pub use containers::DatabaseTestContainer;
pub use mocks::{MockSchedulerRegistry, MockTaskRepository};
