//! Configuration loader for YAML files and environment overrides
//!
//! Values are resolved in three layers: built-in defaults, the YAML document,
//! then `JUDGEBOX_*` environment variables. The result is validated before it
//! is handed out.

use std::env;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::config::types::JudgeboxConfig;
use crate::errors::ConfigError;

pub const ENV_MAX_CONCURRENT_EXECUTIONS: &str = "JUDGEBOX_MAX_CONCURRENT_EXECUTIONS";
pub const ENV_MEMORY_LIMIT_MB: &str = "JUDGEBOX_MEMORY_LIMIT_MB";
pub const ENV_RUNTIME: &str = "JUDGEBOX_RUNTIME";
pub const ENV_BUILD_CONTEXT: &str = "JUDGEBOX_BUILD_CONTEXT";
pub const ENV_BROKER_URL: &str = "JUDGEBOX_BROKER_URL";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<JudgeboxConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults (still subject to environment overrides).
    pub async fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<JudgeboxConfig, ConfigError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::info!("No config file at {}, using defaults", path.display());
            Self::resolve(JudgeboxConfig::default())
        }
    }

    /// Load configuration from a YAML string.
    pub fn from_str(content: &str) -> Result<JudgeboxConfig, ConfigError> {
        let config: JudgeboxConfig = if content.trim().is_empty() {
            JudgeboxConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        Self::resolve(config)
    }

    fn resolve(mut config: JudgeboxConfig) -> Result<JudgeboxConfig, ConfigError> {
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(config: &mut JudgeboxConfig) -> Result<(), ConfigError> {
        if let Some(value) = parse_env(ENV_MAX_CONCURRENT_EXECUTIONS)? {
            config.admission.max_concurrent_executions = value;
        }
        if let Some(value) = parse_env(ENV_MEMORY_LIMIT_MB)? {
            config.sandbox.memory_limit_mb = value;
        }
        if let Ok(value) = env::var(ENV_RUNTIME) {
            config.sandbox.runtime = value;
        }
        if let Ok(value) = env::var(ENV_BUILD_CONTEXT) {
            config.sandbox.build_context = value.into();
        }
        if let Ok(value) = env::var(ENV_BROKER_URL) {
            config.queue.broker_url = value;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
