mod dispatcher;
mod observability;

pub use dispatcher::{DispatchOrder, DispatcherConfig};
pub use observability::ObservabilityConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DispError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispConfig {
    /// Dispatcher configuration.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl DispConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DispError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DispError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| DispError::Internal(e.to_string()))?;

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispConfig::default();
        assert_eq!(config.dispatcher.max_workers, 4);
        assert_eq!(config.dispatcher.order, DispatchOrder::Concurrent);
        assert!(config.dispatcher.queue_capacity.is_none());
        assert_eq!(config.observability.level, "info");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = DispConfig::parse_toml("").unwrap();
        assert_eq!(config.dispatcher.max_workers, 4);
        assert_eq!(config.dispatcher.drain_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [dispatcher]
            max_workers = 8
            queue_capacity = 64
            order = "fifo"
            drain_timeout_ms = 500
            drain_poll_interval_ms = 10

            [observability]
            level = "debug"
            json_format = true
        "#;

        let config = DispConfig::parse_toml(toml).unwrap();
        assert_eq!(config.dispatcher.max_workers, 8);
        assert_eq!(config.dispatcher.queue_capacity, Some(64));
        assert_eq!(config.dispatcher.order, DispatchOrder::Fifo);
        assert_eq!(config.dispatcher.drain_timeout(), Duration::from_millis(500));
        assert_eq!(
            config.dispatcher.drain_poll_interval(),
            Duration::from_millis(10)
        );
        assert_eq!(config.observability.level, "debug");
        assert!(config.observability.json_format);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let toml = r#"
            [dispatcher]
            max_workers = 0
        "#;

        let err = DispConfig::parse_toml(toml).unwrap_err();
        assert!(matches!(err, DispError::InvalidWorkerCount(0)));
    }

    #[test]
    fn test_unknown_order_rejected() {
        let toml = r#"
            [dispatcher]
            order = "priority"
        "#;

        assert!(matches!(
            DispConfig::parse_toml(toml),
            Err(DispError::Config(_))
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DISP_TEST_MAX_WORKERS", "6");

        let toml = r#"
            [dispatcher]
            max_workers = ${DISP_TEST_MAX_WORKERS}
        "#;

        let config = DispConfig::parse_toml(toml).unwrap();
        assert_eq!(config.dispatcher.max_workers, 6);

        std::env::remove_var("DISP_TEST_MAX_WORKERS");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatcher]\nmax_workers = 2").unwrap();

        let config = DispConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dispatcher.max_workers, 2);
    }

    #[test]
    fn test_missing_file() {
        let err = DispConfig::from_file("/nonexistent/disp.toml").unwrap_err();
        assert!(matches!(err, DispError::Config(_)));
    }
}
