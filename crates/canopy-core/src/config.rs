//! OrchestratorConfig - TOML で与える実行時設定
//!
//! 全ての項目に既定値があるので、空のファイルや設定なしでも起動できます。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::MonitorSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// モニタループの間隔（秒）
    pub monitor_interval_secs: u64,
    pub spawn_monitor_loops: bool,
    /// BroadcastEventSink のバッファ
    pub event_channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 60,
            spawn_monitor_loops: true,
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("monitor_interval_secs must be greater than zero")]
    ZeroInterval,
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        if config.monitor_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.monitor_interval_secs),
            spawn_loops: self.spawn_monitor_loops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.monitor_settings().interval, Duration::from_secs(60));
        assert!(config.monitor_settings().spawn_loops);
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = OrchestratorConfig::from_toml_str(
            "monitor_interval_secs = 5\nspawn_monitor_loops = false\n",
        )
        .unwrap();
        assert_eq!(config.monitor_interval_secs, 5);
        assert!(!config.spawn_monitor_loops);
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            OrchestratorConfig::from_toml_str("monitor_interval_secs = 0"),
            Err(ConfigError::ZeroInterval)
        ));
        assert!(matches!(
            OrchestratorConfig::from_toml_str("monitor_interval_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = OrchestratorConfig::load("/nonexistent/canopy.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/canopy.toml"));
    }
}
