use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use chronos_core::{SchedulerError, SchedulerResult};

use crate::handler::TaskHandler;

const COMPONENT: &str = "HandlerManager";

/// The capability the task manager needs for scheduling validation; lets
/// tests substitute a stub registry.
pub trait HandlerRegistry: Send + Sync {
    fn is_initialized(&self) -> bool;

    /// Whether a handler is registered under `name`. Fails with
    /// `NotInitialized` before `init`.
    fn contains(&self, name: &str) -> SchedulerResult<bool>;
}

/// Process-local registry mapping task name to handler callback.
///
/// Registrations live and die with this instance; nothing here is
/// persisted. Each scheduler instance only executes tasks for which it
/// holds a registered handler.
#[derive(Default)]
pub struct HandlerManager {
    handlers: Mutex<HashMap<String, Arc<dyn TaskHandler>>>,
    initialized: AtomicBool,
}

impl HandlerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn init(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    fn ensure_initialized(&self) -> SchedulerResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::not_initialized(COMPONENT))
        }
    }

    /// Register a handler under `name`. Returns `false` without touching the
    /// registry if the name is taken; existing registrations are never
    /// overwritten.
    pub fn register_task_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> SchedulerResult<bool> {
        self.ensure_initialized()?;

        let name = name.into();
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.contains_key(&name) {
            return Ok(false);
        }
        debug!(name = %name, "registered task handler");
        handlers.insert(name, handler);
        Ok(true)
    }

    /// Returns `false` if no handler is registered under `name`.
    pub fn remove_task_handler(&self, name: &str) -> SchedulerResult<bool> {
        self.ensure_initialized()?;
        Ok(self.handlers.lock().unwrap().remove(name).is_some())
    }

    /// Snapshot of the current registry.
    pub fn task_handlers(&self) -> SchedulerResult<HashMap<String, Arc<dyn TaskHandler>>> {
        self.ensure_initialized()?;
        Ok(self.handlers.lock().unwrap().clone())
    }
}

impl HandlerRegistry for HandlerManager {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn contains(&self, name: &str) -> SchedulerResult<bool> {
        self.ensure_initialized()?;
        Ok(self.handlers.lock().unwrap().contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;

    fn noop_handler() -> Arc<dyn TaskHandler> {
        handler_fn(|_payload: String| async move { Ok(()) })
    }

    #[test]
    fn operations_fail_before_init() {
        let manager = HandlerManager::new();

        assert!(matches!(
            manager.register_task_handler("test", noop_handler()),
            Err(SchedulerError::NotInitialized { .. })
        ));
        assert!(matches!(
            manager.remove_task_handler("test"),
            Err(SchedulerError::NotInitialized { .. })
        ));
        assert!(matches!(
            manager.task_handlers(),
            Err(SchedulerError::NotInitialized { .. })
        ));
        assert!(matches!(
            manager.contains("test"),
            Err(SchedulerError::NotInitialized { .. })
        ));
    }

    #[test]
    fn init_is_idempotent_and_preserves_registrations() {
        let manager = HandlerManager::new();
        manager.init();
        assert!(manager.register_task_handler("test", noop_handler()).unwrap());

        manager.init();
        assert!(manager.contains("test").unwrap());
    }

    #[test]
    fn register_does_not_overwrite() {
        let manager = HandlerManager::new();
        manager.init();

        assert!(manager.register_task_handler("test", noop_handler()).unwrap());
        assert!(!manager.register_task_handler("test", noop_handler()).unwrap());
        assert_eq!(manager.task_handlers().unwrap().len(), 1);
    }

    #[test]
    fn remove_reports_absence() {
        let manager = HandlerManager::new();
        manager.init();

        assert!(!manager.remove_task_handler("missing").unwrap());

        manager
            .register_task_handler("test", noop_handler())
            .unwrap();
        assert!(manager.remove_task_handler("test").unwrap());
        assert!(!manager.contains("test").unwrap());
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let manager = HandlerManager::new();
        manager.init();
        manager
            .register_task_handler("test", noop_handler())
            .unwrap();

        let snapshot = manager.task_handlers().unwrap();
        manager.remove_task_handler("test").unwrap();

        assert!(snapshot.contains_key("test"));
        assert!(!manager.contains("test").unwrap());
    }
}
