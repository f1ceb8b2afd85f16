//! Error types for the execution engine
//!
//! Errors are split by the layer that raises them. Everything here is an
//! infrastructure failure: outcomes caused by the submitted code are never
//! errors, they are verdicts (see [`crate::verdict`]).

use thiserror::Error;

/// Failures raised while talking to the container daemon.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Image build failed: {0}")]
    Build(String),
    #[error("Container create/start failed: {0}")]
    Create(String),
    #[error("Harness exec failed: {0}")]
    Exec(String),
    #[error("Sandbox teardown failed: {0}")]
    Teardown(String),
    #[error("Invalid build context '{path}': {reason}")]
    BuildContext { path: String, reason: String },
    #[error("Bollard (Docker client) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    Io(#[from] std::io::Error),
}

/// Violations of the harness-to-host log contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Execution log is empty")]
    EmptyLog,
    #[error("Malformed execution log: {0}")]
    MalformedLog(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Execution engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid environment override {key}='{value}'")]
    Env { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
