// src/sandbox/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, ExecConfig, HostConfig};
use bollard::query_parameters::{
    BuildImageOptionsBuilder,
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    RemoveImageOptions as BollardRemoveImageOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use super::{BuildContext, ContainerHandle, ContainerLimits, HarnessCommand, ImageId, SandboxRuntime};
use crate::errors::SandboxError;

/// [`SandboxRuntime`] backed by the local Docker daemon.
///
/// The connection is created once and shared by every worker; bollard's
/// client is internally reference counted, so clones are cheap.
#[derive(Clone)]
pub struct DockerSandboxRuntime {
    docker: Docker,
}

impl DockerSandboxRuntime {
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn pack_context(path: &Path) -> Result<Vec<u8>, SandboxError> {
        if !path.is_dir() {
            return Err(SandboxError::BuildContext {
                path: path.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, std::io::Error> {
            let mut archive = tar::Builder::new(Vec::new());
            archive.append_dir_all(".", &path)?;
            archive.into_inner()
        })
        .await
        .map_err(|e| SandboxError::Build(format!("Build context packing task failed: {}", e)))?
        .map_err(SandboxError::from)
    }
}

/// 404 (gone) and 409 (removal already in progress) both mean the object is
/// on its way out, which is what teardown wants.
fn is_already_gone(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == 404 || *status_code == 409
    )
}

#[async_trait]
impl SandboxRuntime for DockerSandboxRuntime {
    async fn ping(&self) -> Result<(), SandboxError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn build_image(&self, context: &BuildContext, tag: &str) -> Result<ImageId, SandboxError> {
        let archive = Self::pack_context(&context.path).await?;

        let options = BuildImageOptionsBuilder::default()
            .dockerfile(&context.dockerfile)
            .t(tag)
            .rm(true)
            .forcerm(true)
            .nocache(true)
            .build();

        let mut build_stream = Box::pin(self.docker.build_image(
            options,
            None,
            Some(bollard::body_full(archive.into())),
        ));

        while let Some(build_result) = build_stream.next().await {
            let info = build_result.map_err(|e| SandboxError::Build(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(SandboxError::Build(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    log::debug!("[build {}] {}", tag, line);
                }
            }
        }

        let image = self
            .docker
            .inspect_image(tag)
            .await
            .map_err(|e| SandboxError::Build(format!("Built image '{}' not found: {}", tag, e)))?;

        image
            .id
            .map(ImageId)
            .ok_or_else(|| SandboxError::Build(format!("Built image '{}' has no id", tag)))
    }

    async fn create_and_start(
        &self,
        image: &ImageId,
        name: &str,
        limits: &ContainerLimits,
    ) -> Result<ContainerHandle, SandboxError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(name.to_string()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(image.0.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            network_disabled: Some(limits.network_disabled),
            host_config: Some(HostConfig {
                memory: Some(limits.memory_bytes),
                memory_swap: Some(limits.memory_bytes),
                runtime: limits.runtime.clone(),
                network_mode: if limits.network_disabled {
                    Some("none".to_string())
                } else {
                    None
                },
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| SandboxError::Create(e.to_string()))?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            // A created-but-never-started container is not auto-removed.
            let handle = ContainerHandle { id: container.id };
            if let Err(cleanup) = self.remove_container(&handle).await {
                log::warn!("Failed to remove unstarted container {}: {}", handle.id, cleanup);
            }
            return Err(SandboxError::Create(e.to_string()));
        }

        Ok(ContainerHandle { id: container.id })
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        command: &HarnessCommand,
        max_output_bytes: usize,
    ) -> Result<String, SandboxError> {
        let config = ExecConfig {
            cmd: Some(command.argv().to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&container.id, config)
            .await
            .map_err(|e| SandboxError::Exec(e.to_string()))?;

        let started = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| SandboxError::Exec(e.to_string()))?;

        let mut output = match started {
            StartExecResults::Attached { output, .. } => output,
            StartExecResults::Detached => {
                return Err(SandboxError::Exec("Exec started detached, no output to capture".to_string()))
            }
        };

        let mut captured: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(log_result) = output.next().await {
            let message = match log_result.map_err(|e| SandboxError::Exec(e.to_string()))? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => message,
                LogOutput::StdIn { .. } => continue,
            };
            if truncated {
                continue;
            }
            let room = max_output_bytes.saturating_sub(captured.len());
            if message.len() > room {
                captured.extend_from_slice(&message[..room]);
                truncated = true;
                log::warn!(
                    "Harness output in container {} exceeded {} bytes, truncating",
                    container.id,
                    max_output_bytes
                );
            } else {
                captured.extend_from_slice(&message);
            }
        }

        Ok(String::from_utf8_lossy(&captured).into_owned())
    }

    async fn stop_container(&self, container: &ContainerHandle, timeout: Duration) -> Result<(), SandboxError> {
        let options = Some(BollardStopContainerOptionsQuery {
            t: Some(i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)),
            ..Default::default()
        });
        match self.docker.stop_container(&container.id, options).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) if is_already_gone(&e) => Ok(()),
            Err(e) => Err(SandboxError::Teardown(e.to_string())),
        }
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), SandboxError> {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            v: true,
            ..Default::default()
        });
        match self.docker.remove_container(&container.id, options).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_gone(&e) => Ok(()),
            Err(e) => Err(SandboxError::Teardown(e.to_string())),
        }
    }

    async fn remove_image(&self, reference: &str) -> Result<(), SandboxError> {
        let options = Some(BollardRemoveImageOptionsQuery {
            force: true,
            ..Default::default()
        });
        match self.docker.remove_image(reference, options, None).await {
            Ok(_) => Ok(()),
            Err(e) if matches!(&e, BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(SandboxError::Teardown(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_pack_context_archives_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM python:3.11-slim\n").unwrap();
        fs::write(dir.path().join("run.sh"), "echo ok\n").unwrap();

        let archive = DockerSandboxRuntime::pack_context(dir.path()).await.unwrap();

        let mut names: Vec<String> = tar::Archive::new(std::io::Cursor::new(archive))
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
        assert!(names.iter().any(|n| n.ends_with("run.sh")));
    }

    #[tokio::test]
    async fn test_pack_context_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = DockerSandboxRuntime::pack_context(&missing).await.unwrap_err();
        assert!(matches!(err, SandboxError::BuildContext { .. }));
    }

    #[test]
    fn test_already_gone_status_codes() {
        let gone = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "no such container".to_string(),
        };
        let busy = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "removal in progress".to_string(),
        };
        let broken = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(is_already_gone(&gone));
        assert!(is_already_gone(&busy));
        assert!(!is_already_gone(&broken));
    }
}
