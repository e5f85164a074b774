use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info};

use chronos_core::SchedulerResult;
use chronos_domain::SchedulerRegistry;

/// Liveness facet of a distributed scheduler.
///
/// Registers one row for this process and refreshes its `last_ping_at` on a
/// fixed interval so peers sharing the datastore can eventually tell alive
/// schedulers from dead ones. Purely informational: execution mutual
/// exclusion is the row lock's job. The liveness row is not removed on
/// teardown; nothing consumes that signal yet.
pub struct HeartbeatCoordinator {
    registry: Arc<dyn SchedulerRegistry>,
    ping_interval: Duration,
    scheduler_id: Mutex<Option<i64>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl HeartbeatCoordinator {
    pub fn new(registry: Arc<dyn SchedulerRegistry>, ping_interval_ms: u64) -> Self {
        Self {
            registry,
            ping_interval: Duration::from_millis(ping_interval_ms),
            scheduler_id: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Ensure the liveness table, insert this process's row, and start the
    /// heartbeat loop. Idempotent: a second call while the loop is running
    /// does nothing.
    pub async fn init(&self) -> SchedulerResult<i64> {
        if let Some(id) = *self.scheduler_id.lock().unwrap() {
            return Ok(id);
        }

        self.registry.ensure_schema().await?;
        let id = self.registry.register().await?;
        *self.scheduler_id.lock().unwrap() = Some(id);

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let registry = Arc::clone(&self.registry);
        let ping_interval = self.ping_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = registry.ping(id).await {
                            error!(scheduler_id = id, error = %e, "heartbeat ping failed");
                        } else {
                            debug!(scheduler_id = id, "heartbeat ping");
                        }
                    }
                    _ = rx.changed() => {
                        info!(scheduler_id = id, "heartbeat loop stopped");
                        break;
                    }
                }
            }
        });

        info!(scheduler_id = id, "registered scheduler liveness row");
        Ok(id)
    }

    pub fn scheduler_id(&self) -> Option<i64> {
        *self.scheduler_id.lock().unwrap()
    }

    /// Cancel the heartbeat loop. The liveness row stays behind.
    pub fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use chronos_testing_utils::MockSchedulerRegistry;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn registers_once_and_pings_on_interval() {
        let registry = MockSchedulerRegistry::new();
        let coordinator = HeartbeatCoordinator::new(Arc::new(registry.clone()), 10_000);

        let id = coordinator.init().await.unwrap();
        assert_eq!(coordinator.scheduler_id(), Some(id));
        assert_eq!(registry.instance_count(), 1);

        // A second init is a no-op.
        assert_eq!(coordinator.init().await.unwrap(), id);
        assert_eq!(registry.instance_count(), 1);

        tokio::time::sleep(Duration::from_millis(35_000)).await;
        assert_eq!(registry.ping_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_loop() {
        let registry = MockSchedulerRegistry::new();
        let coordinator = HeartbeatCoordinator::new(Arc::new(registry.clone()), 1_000);

        coordinator.init().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let pings_before = registry.ping_count();
        assert!(pings_before >= 2);

        coordinator.stop();
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(registry.ping_count(), pings_before);
    }
}
