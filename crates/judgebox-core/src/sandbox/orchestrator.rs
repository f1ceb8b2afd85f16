//! One build/start/exec/teardown cycle per job

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{
    BuildContext, ContainerHandle, ContainerLimits, ContainerState, HarnessCommand, ImageId,
    SandboxRuntime,
};
use crate::config::SandboxConfig;
use crate::errors::SandboxError;

/// Resources a single job currently holds. Teardown consumes it.
struct SandboxLease {
    job_id: Uuid,
    tag: String,
    image: ImageId,
    container: Option<(ContainerHandle, ContainerState)>,
}

/// Drives a [`SandboxRuntime`] through the lifecycle of one sandboxed run.
///
/// Every call to [`run`](Self::run) owns exactly one image tag and at most one
/// container, and removes both before returning, whichever step failed.
pub struct SandboxOrchestrator {
    runtime: Arc<dyn SandboxRuntime>,
    context: BuildContext,
    limits: ContainerLimits,
    image_prefix: String,
    stop_timeout: Duration,
    max_log_bytes: usize,
}

impl SandboxOrchestrator {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: &SandboxConfig, max_log_bytes: usize) -> Self {
        Self {
            runtime,
            context: BuildContext {
                path: config.build_context.clone(),
                dockerfile: config.dockerfile.clone(),
            },
            limits: ContainerLimits::from(config),
            image_prefix: config.image_prefix.clone(),
            stop_timeout: config.stop_timeout(),
            max_log_bytes,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    /// Build a fresh image, start a container from it, run `command` and return
    /// the captured log. Teardown always runs before this returns.
    pub async fn run(&self, job_id: Uuid, command: &HarnessCommand) -> Result<String, SandboxError> {
        let tag = format!("{}:{}", self.image_prefix, job_id);
        let image = self.runtime.build_image(&self.context, &tag).await?;
        log::info!("[job {}] Built sandbox image {} ({})", job_id, tag, image);

        let mut lease = SandboxLease {
            job_id,
            tag,
            image,
            container: None,
        };
        let outcome = self.run_in_lease(&mut lease, command).await;
        self.teardown(lease).await;
        outcome
    }

    async fn run_in_lease(
        &self,
        lease: &mut SandboxLease,
        command: &HarnessCommand,
    ) -> Result<String, SandboxError> {
        let name = format!("{}-{}", self.image_prefix.replace(['/', ':'], "-"), lease.job_id);
        let container = self
            .runtime
            .create_and_start(&lease.image, &name, &self.limits)
            .await?;
        log::info!("[job {}] Started container {}", lease.job_id, container.id);
        lease.container = Some((container.clone(), ContainerState::Running));

        let output = self.runtime.exec(&container, command, self.max_log_bytes).await?;
        log::debug!(
            "[job {}] Harness finished with {} bytes of output",
            lease.job_id,
            output.len()
        );
        Ok(output)
    }

    /// Stop and remove the container, then remove the job's image tag.
    /// Failures are logged and never mask the outcome of the run.
    ///
    /// The image goes by tag, not id: another job's tag on the same image
    /// keeps that image alive.
    async fn teardown(&self, lease: SandboxLease) {
        let SandboxLease {
            job_id,
            tag,
            image: _,
            container,
        } = lease;

        if let Some((container, mut state)) = container {
            if state == ContainerState::Running {
                match self.runtime.stop_container(&container, self.stop_timeout).await {
                    Ok(()) => state = ContainerState::Stopped,
                    Err(e) => log::warn!("[job {}] Failed to stop container {}: {}", job_id, container.id, e),
                }
            }
            match self.runtime.remove_container(&container).await {
                Ok(()) => {
                    state = ContainerState::Removed;
                    log::debug!("[job {}] Removed container {}", job_id, container.id);
                }
                Err(e) => log::error!("[job {}] Failed to remove container {}: {}", job_id, container.id, e),
            }
            if state != ContainerState::Removed {
                log::error!("[job {}] Container {} left in state {:?}", job_id, container.id, state);
            }
        }

        match self.runtime.remove_image(&tag).await {
            Ok(()) => log::debug!("[job {}] Removed image {}", job_id, tag),
            Err(e) => log::error!("[job {}] Failed to remove image {}: {}", job_id, tag, e),
        }
    }
}
