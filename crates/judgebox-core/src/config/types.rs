//! Configuration type definitions for the execution engine
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration: five concurrent executions, a 128 MiB
//! memory cap and the gVisor `runsc` isolation runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;

/// Docker refuses memory limits below 6 MiB.
pub const MIN_MEMORY_LIMIT_MB: u64 = 6;
/// 1 TiB.
pub const MAX_MEMORY_LIMIT_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct JudgeboxConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Directory holding the Dockerfile and harness scripts.
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// Container isolation runtime. Empty means the daemon default (runc).
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_true")]
    pub network_disabled: bool,
    #[serde(default = "default_tests_entrypoint")]
    pub tests_entrypoint: String,
    #[serde(default = "default_stdin_entrypoint")]
    pub stdin_entrypoint: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Repository part of the per-job image tag and container name prefix.
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    /// Grace period before a stopping container is killed. The harness
    /// shell runs as PID 1 and ignores SIGTERM, so waiting is pointless.
    #[serde(default)]
    pub stop_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,
    /// How long a submission may wait for a slot. Unset waits indefinitely.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_diagnostic_bytes")]
    pub max_diagnostic_bytes: usize,
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,
}

/// Handed to the task-queue collaborator untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            build_context: default_build_context(),
            dockerfile: default_dockerfile(),
            memory_limit_mb: default_memory_limit_mb(),
            runtime: default_runtime(),
            network_disabled: true,
            tests_entrypoint: default_tests_entrypoint(),
            stdin_entrypoint: default_stdin_entrypoint(),
            shell: default_shell(),
            image_prefix: default_image_prefix(),
            stop_timeout_secs: 0,
        }
    }
}

impl SandboxConfig {
    /// Memory cap in bytes, saturating at `i64::MAX`.
    pub fn memory_limit_bytes(&self) -> i64 {
        i64::try_from(self.memory_limit_mb)
            .ok()
            .and_then(|mb| mb.checked_mul(1024 * 1024))
            .unwrap_or(i64::MAX)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: default_max_concurrent_executions(),
            acquire_timeout_secs: None,
        }
    }
}

impl AdmissionConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_diagnostic_bytes: default_max_diagnostic_bytes(),
            max_log_bytes: default_max_log_bytes(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_build_context() -> PathBuf { PathBuf::from("./sandbox") }
fn default_dockerfile() -> String { "Dockerfile".to_string() }
fn default_memory_limit_mb() -> u64 { 128 }
fn default_runtime() -> String { "runsc".to_string() }
fn default_true() -> bool { true }
fn default_tests_entrypoint() -> String { "run.sh".to_string() }
fn default_stdin_entrypoint() -> String { "run_stdin.sh".to_string() }
fn default_shell() -> String { "/bin/sh".to_string() }
fn default_image_prefix() -> String { "judgebox-sandbox".to_string() }
fn default_max_concurrent_executions() -> usize { crate::admission::DEFAULT_MAX_CONCURRENT_EXECUTIONS }
fn default_max_diagnostic_bytes() -> usize { crate::protocol::DEFAULT_MAX_DIAGNOSTIC_BYTES }
fn default_max_log_bytes() -> usize { 1024 * 1024 }
fn default_broker_url() -> String { "redis://127.0.0.1:6379/0".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl JudgeboxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.max_concurrent_executions == 0 {
            return Err(ConfigError::Invalid(
                "admission.max_concurrent_executions must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.memory_limit_mb < MIN_MEMORY_LIMIT_MB
            || self.sandbox.memory_limit_mb > MAX_MEMORY_LIMIT_MB
        {
            return Err(ConfigError::Invalid(format!(
                "sandbox.memory_limit_mb must be between {} and {}",
                MIN_MEMORY_LIMIT_MB, MAX_MEMORY_LIMIT_MB
            )));
        }

        for (name, value) in [
            ("sandbox.dockerfile", &self.sandbox.dockerfile),
            ("sandbox.tests_entrypoint", &self.sandbox.tests_entrypoint),
            ("sandbox.stdin_entrypoint", &self.sandbox.stdin_entrypoint),
            ("sandbox.shell", &self.sandbox.shell),
            ("sandbox.image_prefix", &self.sandbox.image_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} cannot be empty", name)));
            }
        }

        if self.sandbox.image_prefix.contains(':') {
            return Err(ConfigError::Invalid(
                "sandbox.image_prefix must not contain a tag".to_string(),
            ));
        }

        if self.protocol.max_diagnostic_bytes == 0 || self.protocol.max_log_bytes == 0 {
            return Err(ConfigError::Invalid(
                "protocol size caps must be greater than 0".to_string(),
            ));
        }

        if self.admission.acquire_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "admission.acquire_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}
