use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

/// A registered callback, invoked with a task's opaque payload at execution
/// time. Runs inside the claim transaction: returning `Err` rolls the task
/// back so a later poll can attempt it again.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &str) -> anyhow::Result<()>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct FnTaskHandler<F>
where
    F: Fn(String) -> HandlerFuture + Send + Sync,
{
    f: F,
}

#[async_trait]
impl<F> TaskHandler for FnTaskHandler<F>
where
    F: Fn(String) -> HandlerFuture + Send + Sync,
{
    async fn handle(&self, payload: &str) -> anyhow::Result<()> {
        (self.f)(payload.to_string()).await
    }
}

/// Wrap an async closure as a `TaskHandler`.
///
/// ```
/// use chronos_scheduler::handler_fn;
///
/// let handler = handler_fn(|payload: String| async move {
///     println!("got {payload}");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnTaskHandler {
        f: move |payload: String| Box::pin(f(payload)) as HandlerFuture,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn closure_handler_receives_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handler = handler_fn(move |payload: String| {
            let seen = Arc::clone(&seen);
            async move {
                assert_eq!(payload, "{\"k\":1}");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        handler.handle("{\"k\":1}").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closure_handler_propagates_errors() {
        let handler =
            handler_fn(|_payload: String| async move { Err(anyhow::anyhow!("boom")) });
        assert!(handler.handle("{}").await.is_err());
    }
}
