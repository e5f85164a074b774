use std::path::Path;

use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// How the scheduler consumes due work once started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One poll-and-execute pass, intended for externally driven invocation.
    #[default]
    Single,
    /// Continuous in-process loop with per-task timers.
    Realtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/chronos".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub database: DatabaseConfig,
    /// Logical partition isolating this scheduler's tasks from others
    /// sharing the same database.
    pub namespace: String,
    pub execution_mode: ExecutionMode,
    /// Poll period of the realtime loop.
    pub handle_interval_ms: u64,
    /// Delete rows past the retention window during init.
    pub clear_outdated_tasks: bool,
    /// Retention window: tasks older than `now - max_task_age_ms` are no
    /// longer executable and are eligible for cleanup.
    pub max_task_age_ms: i64,
    /// Register a liveness row and run the heartbeat loop.
    pub distributed: bool,
    pub ping_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            namespace: "default".to_string(),
            execution_mode: ExecutionMode::Single,
            handle_interval_ms: 30_000,
            clear_outdated_tasks: false,
            max_task_age_ms: 86_400_000,
            distributed: false,
            ping_interval_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from an optional TOML file plus `CHRONOS_`-prefixed
    /// environment variables (`CHRONOS_DATABASE__URL=...`), then validate.
    pub fn load(config_path: Option<&str>) -> SchedulerResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(SchedulerError::config_error(format!(
                    "configuration file does not exist: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(Environment::with_prefix("CHRONOS").separator("__"));

        let config: SchedulerConfig = builder
            .build()
            .map_err(|e| SchedulerError::config_error(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SchedulerError::config_error(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.database.url.is_empty() {
            return Err(SchedulerError::config_error("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(SchedulerError::config_error(
                "database.max_connections must be greater than zero",
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(SchedulerError::config_error(
                "database.min_connections must not exceed database.max_connections",
            ));
        }
        if self.namespace.is_empty() {
            return Err(SchedulerError::config_error("namespace must not be empty"));
        }
        if self.handle_interval_ms == 0 {
            return Err(SchedulerError::config_error(
                "handle_interval_ms must be greater than zero",
            ));
        }
        if self.max_task_age_ms <= 0 {
            return Err(SchedulerError::config_error(
                "max_task_age_ms must be greater than zero",
            ));
        }
        if self.distributed && self.ping_interval_ms == 0 {
            return Err(SchedulerError::config_error(
                "ping_interval_ms must be greater than zero in distributed mode",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SchedulerConfig::default();
        assert_eq!(config.execution_mode, ExecutionMode::Single);
        assert_eq!(config.handle_interval_ms, 30_000);
        assert_eq!(config.ping_interval_ms, 10_000);
        assert!(!config.clear_outdated_tasks);
        assert!(!config.distributed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_namespace() {
        let config = SchedulerConfig {
            namespace: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_zero_handle_interval() {
        let config = SchedulerConfig {
            handle_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = SchedulerConfig::default();
        config.database.min_connections = 20;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
namespace = "billing"
execution_mode = "realtime"
handle_interval_ms = 5000

[database]
url = "postgresql://localhost/chronos_test"
max_connections = 4
"#
        )
        .expect("write config");

        let config =
            SchedulerConfig::load(Some(file.path().to_str().unwrap())).expect("load config");
        assert_eq!(config.namespace, "billing");
        assert_eq!(config.execution_mode, ExecutionMode::Realtime);
        assert_eq!(config.handle_interval_ms, 5000);
        assert_eq!(config.database.max_connections, 4);
        // Unset keys fall back to defaults.
        assert_eq!(config.ping_interval_ms, 10_000);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = SchedulerConfig::load(Some("/nonexistent/chronos.toml"));
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }
}
