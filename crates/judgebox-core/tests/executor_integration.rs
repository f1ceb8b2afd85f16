use async_trait::async_trait;
use judgebox_core::config::JudgeboxConfig;
use judgebox_core::errors::SandboxError;
use judgebox_core::sandbox::{
    BuildContext, ContainerHandle, ContainerLimits, HarnessCommand, ImageId, SandboxRuntime,
};
use judgebox_core::{JobExecutor, ResultCode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CACHED_IMAGE_ID: &str = "sha256:0d1f7c";

/// Fake daemon that answers each exec by looking at the harness argv, the
/// way the real harness would react to the submitted code.
///
/// Every build resolves to the same image id, as a daemon serving layers
/// from its build cache would; only the per-job tags differ.
#[derive(Default)]
struct ScriptedDaemon {
    tags: Mutex<HashSet<String>>,
    containers: Mutex<HashSet<String>>,
    images_built: AtomicUsize,
    containers_created: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    limits_seen: Mutex<Vec<ContainerLimits>>,
    commands_seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedDaemon {
    fn harness_output(argv: &[String]) -> String {
        let entrypoint = argv.get(1).map(String::as_str).unwrap_or_default();
        let code = argv.get(3).map(String::as_str).unwrap_or_default();
        match (entrypoint, code) {
            ("run.sh", "x=int(input());print(x*2)") => "[PASSED] test1\n".to_string(),
            ("run.sh", "print(1/0)") => {
                "[ERROR] test1\nTraceback (most recent call last):\nZeroDivisionError: division by zero\n"
                    .to_string()
            }
            ("run_stdin.sh", "while True: pass") => "Terminated\n".to_string(),
            ("run_stdin.sh", "import sys; sys.exit(1)") => "[ERROR]\n\n".to_string(),
            ("run_stdin.sh", _) => format!("[OUTPUT]\n{}\n", argv.get(2).cloned().unwrap_or_default()),
            ("run.sh", "crash") => String::new(),
            _ => "[FAILED] test1\n".to_string(),
        }
    }

    fn leaked(&self) -> usize {
        self.tags.lock().unwrap().len() + self.containers.lock().unwrap().len()
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedDaemon {
    async fn ping(&self) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn build_image(&self, _context: &BuildContext, tag: &str) -> Result<ImageId, SandboxError> {
        self.images_built.fetch_add(1, Ordering::SeqCst);
        assert!(self.tags.lock().unwrap().insert(tag.to_string()), "tag reused");
        Ok(ImageId(CACHED_IMAGE_ID.to_string()))
    }

    async fn create_and_start(
        &self,
        image: &ImageId,
        name: &str,
        limits: &ContainerLimits,
    ) -> Result<ContainerHandle, SandboxError> {
        if image.0 != CACHED_IMAGE_ID || self.tags.lock().unwrap().is_empty() {
            return Err(SandboxError::Create(format!("No such image: {}", image)));
        }
        self.containers_created.fetch_add(1, Ordering::SeqCst);
        self.limits_seen.lock().unwrap().push(limits.clone());
        self.containers.lock().unwrap().insert(name.to_string());
        Ok(ContainerHandle { id: name.to_string() })
    }

    async fn exec(
        &self,
        _container: &ContainerHandle,
        command: &HarnessCommand,
        _max_output_bytes: usize,
    ) -> Result<String, SandboxError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
        self.commands_seen.lock().unwrap().push(command.argv().to_vec());
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Self::harness_output(command.argv()))
    }

    async fn stop_container(&self, _container: &ContainerHandle, _timeout: Duration) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), SandboxError> {
        self.containers.lock().unwrap().remove(&container.id);
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<(), SandboxError> {
        let mut tags = self.tags.lock().unwrap();
        if reference == CACHED_IMAGE_ID {
            // Force-removing by id drops the image and every tag on it.
            tags.clear();
        } else {
            tags.remove(reference);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_tests_job_end_to_end() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let executor = JobExecutor::new(daemon.clone(), &JudgeboxConfig::default());

    let verdict = executor
        .submit_tests("2\n4\n", "x=int(input());print(x*2)")
        .await
        .unwrap();

    assert_eq!(verdict.code(), Some(ResultCode::Ok));
    assert_eq!(verdict.failing_test(), None);
    assert_eq!(verdict.to_json()["test"], "");
    assert_eq!(
        daemon.commands_seen.lock().unwrap()[0],
        vec!["/bin/sh", "run.sh", "2\n4\n", "x=int(input());print(x*2)"]
    );
    assert_eq!(daemon.leaked(), 0);
}

#[tokio::test]
async fn test_stdin_job_infinite_loop_is_time_limit() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let executor = JobExecutor::new(daemon.clone(), &JudgeboxConfig::default());

    let verdict = executor.submit_stdin("", "while True: pass").await.unwrap();

    assert_eq!(verdict.code(), Some(ResultCode::TimeLimit));
    assert_eq!(verdict.stderr(), "timeout");
    assert_eq!(daemon.leaked(), 0);
}

#[tokio::test]
async fn test_traceback_is_compilation_error() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let executor = JobExecutor::new(daemon, &JudgeboxConfig::default());

    let verdict = executor.submit_tests("1\n", "print(1/0)").await.unwrap();

    assert_eq!(verdict.code(), Some(ResultCode::CompilationError));
    assert_eq!(verdict.failing_test(), Some(1));
    assert!(verdict.stderr().ends_with("ZeroDivisionError: division by zero"));
}

#[tokio::test]
async fn test_harness_crash_is_infra_error() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let executor = JobExecutor::new(daemon.clone(), &JudgeboxConfig::default());

    let verdict = executor.submit_tests("", "crash").await.unwrap();

    assert!(verdict.is_infra_error());
    assert_eq!(verdict.to_json()["code"], "");
    assert_eq!(daemon.leaked(), 0);
}

#[tokio::test]
async fn test_stdin_exit_without_stderr_is_compilation_error() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let executor = JobExecutor::new(daemon.clone(), &JudgeboxConfig::default());

    let verdict = executor.submit_stdin("", "import sys; sys.exit(1)").await.unwrap();

    assert_eq!(verdict.code(), Some(ResultCode::CompilationError));
    assert_eq!(verdict.to_json()["error"], "");
    assert_eq!(daemon.leaked(), 0);
}

#[tokio::test]
async fn test_containers_get_configured_limits() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let mut config = JudgeboxConfig::default();
    config.sandbox.memory_limit_mb = 64;
    let executor = JobExecutor::new(daemon.clone(), &config);

    executor.submit_stdin("hi", "print(input())").await.unwrap();

    let limits = daemon.limits_seen.lock().unwrap();
    assert_eq!(limits[0].memory_bytes, 64 * 1024 * 1024);
    assert!(limits[0].network_disabled);
    assert_eq!(limits[0].runtime.as_deref(), Some("runsc"));
}

#[tokio::test]
async fn test_concurrent_jobs_are_bounded_and_isolated() {
    let daemon = Arc::new(ScriptedDaemon::default());
    let mut config = JudgeboxConfig::default();
    config.admission.max_concurrent_executions = 3;
    let executor = JobExecutor::new(daemon.clone(), &config);

    let mut handles = Vec::new();
    for i in 0..12 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor.submit_stdin(format!("{}", i), "print(input())").await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let verdict = handle.await.unwrap().unwrap();
        assert_eq!(verdict.code(), Some(ResultCode::Ok));
        assert_eq!(verdict.stdout(), format!("{}\n", i));
    }

    assert!(daemon.peak_running.load(Ordering::SeqCst) <= 3);
    assert_eq!(daemon.images_built.load(Ordering::SeqCst), 12);
    assert_eq!(daemon.containers_created.load(Ordering::SeqCst), 12);
    assert_eq!(daemon.leaked(), 0);
    assert_eq!(executor.admission().in_flight(), 0);
}
