//! Container sandbox used to run untrusted code.
//!
//! [`SandboxRuntime`] is the seam to the container daemon. The production
//! implementation is [`docker::DockerSandboxRuntime`]; tests substitute a
//! recording mock. [`orchestrator::SandboxOrchestrator`] drives a runtime
//! through one build/start/exec/teardown cycle per job.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::SandboxConfig;
use crate::errors::SandboxError;
use crate::job::{Job, JobMode};

pub mod docker;
pub mod orchestrator;

pub use docker::DockerSandboxRuntime;
pub use orchestrator::SandboxOrchestrator;

/// Identifier of a freshly built sandbox image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

/// Lifecycle of a sandbox container. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

/// Directory (plus Dockerfile name inside it) the sandbox image is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub path: PathBuf,
    pub dockerfile: String,
}

/// Resource limits applied to every sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLimits {
    pub memory_bytes: i64,
    pub network_disabled: bool,
    /// Isolation runtime name, e.g. `runsc`. `None` uses the daemon default.
    pub runtime: Option<String>,
}

impl From<&SandboxConfig> for ContainerLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            memory_bytes: config.memory_limit_bytes(),
            network_disabled: config.network_disabled,
            runtime: if config.runtime.is_empty() {
                None
            } else {
                Some(config.runtime.clone())
            },
        }
    }
}

/// Argv of the harness entry point executed inside the container.
///
/// User text is passed as discrete arguments, never spliced into a shell
/// string on the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessCommand {
    argv: Vec<String>,
}

impl HarnessCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// `<shell> run.sh <tests> <code>` or `<shell> run_stdin.sh <stdin> <code>`.
    pub fn for_job(job: &Job, config: &SandboxConfig) -> Self {
        let entrypoint = match job.mode() {
            JobMode::Tests => &config.tests_entrypoint,
            JobMode::Stdin => &config.stdin_entrypoint,
        };
        Self::new(vec![
            config.shell.clone(),
            entrypoint.clone(),
            job.input_text().to_string(),
            job.source_code().to_string(),
        ])
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Check that the daemon is reachable.
    async fn ping(&self) -> Result<(), SandboxError>;

    /// Build a fresh image from `context`, tagged `tag`. Never served from cache.
    async fn build_image(&self, context: &BuildContext, tag: &str) -> Result<ImageId, SandboxError>;

    /// Create and start a container. On failure nothing is left behind.
    async fn create_and_start(
        &self,
        image: &ImageId,
        name: &str,
        limits: &ContainerLimits,
    ) -> Result<ContainerHandle, SandboxError>;

    /// Run `command` in the running container and return its combined output,
    /// truncated to `max_output_bytes`.
    async fn exec(
        &self,
        container: &ContainerHandle,
        command: &HarnessCommand,
        max_output_bytes: usize,
    ) -> Result<String, SandboxError>;

    /// Stop the container, killing it once `timeout` has passed.
    async fn stop_container(&self, container: &ContainerHandle, timeout: Duration) -> Result<(), SandboxError>;

    /// Force-remove the container. A container that is already gone counts as removed.
    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), SandboxError>;

    /// Force-remove an image reference. A tag only untags unless it is the
    /// image's last one. An image that is already gone counts as removed.
    async fn remove_image(&self, reference: &str) -> Result<(), SandboxError>;
}
