use tracing_subscriber::EnvFilter;

use crate::errors::{SchedulerError, SchedulerResult};

/// Install the global tracing subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset. Calling this more
/// than once is a no-op so embedding applications and tests can both call it
/// freely.
pub fn init_tracing(default_directive: &str) -> SchedulerResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| SchedulerError::config_error(format!("invalid log directive: {e}")))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        assert!(init_tracing("info").is_ok());
        assert!(init_tracing("debug").is_ok());
    }

    #[test]
    fn rejects_malformed_directive() {
        // Only reachable when RUST_LOG is unset; skip otherwise.
        if std::env::var("RUST_LOG").is_err() {
            assert!(init_tracing("not==valid==filter").is_err());
        }
    }
}
