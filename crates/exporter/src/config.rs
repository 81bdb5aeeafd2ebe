//! Exporter runtime settings
//!
//! Only process-level knobs live here. Everything the engine needs comes
//! from the capacity configuration file this points at.

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Runtime settings, read from `EXPORTER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity configuration file
    #[serde(default = "default_config_path")]
    pub config_path: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Instance name attached to structured log events
    #[serde(default = "default_instance")]
    pub instance: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            log_format: default_log_format(),
            instance: default_instance(),
        }
    }
}

fn default_config_path() -> String {
    "/app/config.yaml".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_instance() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "capacity-exporter".to_string())
}

impl RuntimeConfig {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
