//! Job execution: admission, sandbox run, log decoding and classification
//!
//! [`JobExecutor`] is the interface offered to the API and task-queue layers.
//! Both submission calls resolve only once the sandboxed run has finished and
//! been torn down. Every admitted job yields a [`Verdict`]; the only error a
//! caller can see is [`AdmissionError::Unavailable`].

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::classifier::VerdictClassifier;
use crate::config::{JudgeboxConfig, SandboxConfig};
use crate::errors::{AdmissionError, ProtocolError, SandboxError};
use crate::job::{Job, JobMode};
use crate::protocol::LogParser;
use crate::sandbox::{DockerSandboxRuntime, HarnessCommand, SandboxOrchestrator, SandboxRuntime};
use crate::verdict::Verdict;

pub const EMPTY_TESTS_LOG_MESSAGE: &str = "unknown error while checking code";
pub const EMPTY_STDIN_LOG_MESSAGE: &str = "unknown error while running code";

#[derive(Clone)]
pub struct JobExecutor {
    admission: AdmissionController,
    orchestrator: Arc<SandboxOrchestrator>,
    parser: LogParser,
    sandbox: Arc<SandboxConfig>,
}

impl JobExecutor {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: &JudgeboxConfig) -> Self {
        let admission = AdmissionController::new(config.admission.max_concurrent_executions)
            .with_acquire_timeout(config.admission.acquire_timeout());
        let orchestrator = SandboxOrchestrator::new(runtime, &config.sandbox, config.protocol.max_log_bytes);

        Self {
            admission,
            orchestrator: Arc::new(orchestrator),
            parser: LogParser::new(config.protocol.max_diagnostic_bytes),
            sandbox: Arc::new(config.sandbox.clone()),
        }
    }

    /// Connect to the local Docker daemon and build an executor on top of it.
    pub fn connect(config: &JudgeboxConfig) -> Result<Self, SandboxError> {
        let runtime = DockerSandboxRuntime::connect()?;
        Ok(Self::new(Arc::new(runtime), config))
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        self.orchestrator.runtime()
    }

    /// Grade `code` against `tests`.
    pub async fn submit_tests(
        &self,
        tests: impl Into<String>,
        code: impl Into<String>,
    ) -> Result<Verdict, AdmissionError> {
        self.submit(Job::tests(tests, code)).await
    }

    /// Run `code` with `stdin` as its standard input.
    pub async fn submit_stdin(
        &self,
        stdin: impl Into<String>,
        code: impl Into<String>,
    ) -> Result<Verdict, AdmissionError> {
        self.submit(Job::stdin(stdin, code)).await
    }

    /// Wait for an execution slot, then run `job` on its own worker task.
    ///
    /// The worker owns the slot and the sandbox, so dropping the returned
    /// future does not interrupt teardown.
    pub async fn submit(&self, job: Job) -> Result<Verdict, AdmissionError> {
        let job_id = job.id();
        log::debug!("[job {}] Waiting for admission ({} mode)", job_id, job.mode());
        let permit = self.admission.admit().await?;
        log::info!(
            "[job {}] Admitted ({}/{} slots in use)",
            job_id,
            self.admission.in_flight(),
            self.admission.capacity()
        );

        let worker = self.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            worker.execute(&job).await
        });

        match handle.await {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                // A panicking worker skipped teardown; its image and
                // container may still exist on the daemon.
                log::error!("[job {}] Execution worker failed: {}", job_id, e);
                log::warn!(
                    "[job {}] Sandbox resources tagged with this job id may have leaked",
                    job_id
                );
                Ok(Verdict::infra_error(format!("execution worker failed: {}", e)))
            }
        }
    }

    /// Build, run, parse and classify one job. Never fails: infrastructure
    /// problems become infra-error verdicts.
    async fn execute(&self, job: &Job) -> Verdict {
        let command = HarnessCommand::for_job(job, &self.sandbox);

        let log = match self.orchestrator.run(job.id(), &command).await {
            Ok(log) => log,
            Err(e) => {
                log::error!("[job {}] Sandbox run failed: {}", job.id(), e);
                return Verdict::infra_error(e.to_string());
            }
        };

        let verdict = match self.parser.parse(job.mode(), &log) {
            Ok(signal) => VerdictClassifier::classify(signal),
            Err(ProtocolError::EmptyLog) => {
                log::error!("[job {}] Harness produced no output", job.id());
                Verdict::infra_error(match job.mode() {
                    JobMode::Tests => EMPTY_TESTS_LOG_MESSAGE,
                    JobMode::Stdin => EMPTY_STDIN_LOG_MESSAGE,
                })
            }
            Err(e) => {
                log::error!("[job {}] {}", job.id(), e);
                Verdict::infra_error(e.to_string())
            }
        };

        match verdict.code() {
            Some(code) => log::info!("[job {}] Verdict {}", job.id(), code),
            None => log::info!("[job {}] Infra error", job.id()),
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::orchestrator::mock::{FailAt, MockRuntime};
    use crate::verdict::ResultCode;
    use std::time::Duration;

    fn executor(runtime: Arc<MockRuntime>) -> JobExecutor {
        JobExecutor::new(runtime, &JudgeboxConfig::default())
    }

    #[tokio::test]
    async fn test_tests_job_all_passed() {
        let runtime = Arc::new(MockRuntime::new("[PASSED] test1\n"));
        let verdict = executor(runtime.clone())
            .submit_tests("2\n4\n", "x=int(input());print(x*2)")
            .await
            .unwrap();

        assert_eq!(verdict.code(), Some(ResultCode::Ok));
        assert_eq!(verdict.failing_test(), None);
        assert!(runtime.is_clean());
    }

    #[tokio::test]
    async fn test_tests_job_user_errors() {
        let cases = [
            ("[PASSED] t1\n[FAILED] t2\n", ResultCode::WrongAnswer, 2, ""),
            ("[ERROR] t1\nTraceback...\n", ResultCode::CompilationError, 1, "Traceback..."),
            ("[PASSED] t1\nTerminated\n[ERROR] t2\n", ResultCode::TimeLimit, 2, "timeout"),
        ];
        for (log, code, test, stderr) in cases {
            let runtime = Arc::new(MockRuntime::new(log));
            let verdict = executor(runtime.clone()).submit_tests("", "").await.unwrap();
            assert_eq!(verdict.code(), Some(code));
            assert_eq!(verdict.failing_test(), Some(test));
            assert_eq!(verdict.stderr(), stderr);
            assert!(runtime.is_clean());
        }
    }

    #[tokio::test]
    async fn test_stdin_job_timeout() {
        let runtime = Arc::new(MockRuntime::new("Terminated\n"));
        let verdict = executor(runtime.clone())
            .submit_stdin("", "while True: pass")
            .await
            .unwrap();

        assert_eq!(verdict.code(), Some(ResultCode::TimeLimit));
        assert!(runtime.is_clean());
    }

    #[tokio::test]
    async fn test_stdin_job_output() {
        let runtime = Arc::new(MockRuntime::new("[OUTPUT]\n4\n"));
        let verdict = executor(runtime).submit_stdin("2", "print(int(input())*2)").await.unwrap();
        assert_eq!(verdict.code(), Some(ResultCode::Ok));
        assert_eq!(verdict.stdout(), "4\n");
    }

    #[tokio::test]
    async fn test_empty_log_is_infra_error() {
        let runtime = Arc::new(MockRuntime::new(""));
        let exec = executor(runtime.clone());

        let verdict = exec.submit_tests("", "").await.unwrap();
        assert_eq!(verdict.code(), None);
        assert_eq!(verdict.infra_error_message(), Some(EMPTY_TESTS_LOG_MESSAGE));

        let verdict = exec.submit_stdin("", "").await.unwrap();
        assert_eq!(verdict.infra_error_message(), Some(EMPTY_STDIN_LOG_MESSAGE));
        assert!(runtime.is_clean());
    }

    #[tokio::test]
    async fn test_stdin_error_without_stderr_is_compilation_error() {
        let runtime = Arc::new(MockRuntime::new("[ERROR]\n\n"));
        let verdict = executor(runtime.clone())
            .submit_stdin("", "import sys; sys.exit(1)")
            .await
            .unwrap();

        assert_eq!(verdict.code(), Some(ResultCode::CompilationError));
        assert!(!verdict.is_infra_error());
        assert_eq!(verdict.stderr(), crate::protocol::SILENT_ERROR_DIAGNOSTIC);
        assert!(runtime.is_clean());
    }

    #[tokio::test]
    async fn test_malformed_stdin_log_is_infra_error() {
        let runtime = Arc::new(MockRuntime::new("segfault\n"));
        let verdict = executor(runtime).submit_stdin("", "").await.unwrap();
        assert!(verdict.is_infra_error());
        assert!(verdict.infra_error_message().unwrap().contains("unknown stdout format"));
    }

    #[tokio::test]
    async fn test_sandbox_failures_become_infra_verdicts() {
        for fail_at in [FailAt::Build, FailAt::Create, FailAt::Exec] {
            let runtime = Arc::new(MockRuntime::new("[PASSED] t1\n").failing_at(fail_at));
            let verdict = executor(runtime.clone()).submit_tests("", "").await.unwrap();
            assert!(verdict.is_infra_error(), "{:?} should be an infra error", fail_at);
            assert_eq!(verdict.code(), None);
            assert!(runtime.is_clean(), "{:?} leaked sandbox resources", fail_at);
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_yields_infra_verdict_and_frees_slot() {
        let runtime = Arc::new(MockRuntime::new("").failing_at(FailAt::PanicInExec));
        let exec = executor(runtime.clone());

        let verdict = exec.submit_stdin("", "").await.unwrap();

        assert!(verdict.is_infra_error());
        assert!(verdict.infra_error_message().unwrap().contains("execution worker failed"));
        assert_eq!(exec.admission().in_flight(), 0);
        // Teardown never ran, so the sandbox is left behind.
        assert!(!runtime.is_clean());
    }

    #[tokio::test]
    async fn test_slots_released_after_every_job() {
        let runtime = Arc::new(MockRuntime::new("").failing_at(FailAt::Exec));
        let exec = executor(runtime);
        for _ in 0..10 {
            exec.submit_stdin("", "").await.unwrap();
        }
        assert_eq!(exec.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_submissions() {
        let exec = executor(Arc::new(MockRuntime::new("[OUTPUT]\n")));
        exec.admission().close();
        assert!(matches!(
            exec.submit_stdin("", "").await,
            Err(AdmissionError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_skip_teardown() {
        let runtime = Arc::new(MockRuntime::new("[OUTPUT]\nok\n").with_exec_delay(Duration::from_millis(50)));
        let exec = executor(runtime.clone());

        let submission = exec.submit_stdin("", "");
        let _ = tokio::time::timeout(Duration::from_millis(10), submission).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(runtime.is_clean());
        assert_eq!(exec.admission().in_flight(), 0);
    }
}
