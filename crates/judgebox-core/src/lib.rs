//! Sandboxed execution engine for untrusted code submissions.
//!
//! Submitted code runs inside a freshly built, memory-capped, network-less
//! container under an isolation runtime. A harness inside the container runs
//! the code against tests (or a stdin payload) and reports back over a small
//! textual protocol, which is decoded and classified into a [`Verdict`].
//!
//! # Architecture Overview
//!
//! - **Execution log protocol** ([`protocol`]): forward-only scanners for the
//!   tests and stdin log dialects
//! - **Verdict classification** ([`classifier`], [`verdict`]): pure mapping from
//!   decoded signals to `OK`/`CE`/`WA`/`TL` or an infrastructure error
//! - **Sandbox orchestration** ([`sandbox`]): image build, container start,
//!   harness exec and guaranteed teardown behind the [`SandboxRuntime`] trait
//! - **Admission control** ([`admission`]): bounded number of concurrent runs
//! - **Job execution** ([`executor`]): the `submit_tests`/`submit_stdin` entry points
//! - **Configuration** ([`config`]): YAML with defaults and environment overrides

pub mod admission;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod executor;
pub mod job;
pub mod protocol;
pub mod sandbox;
pub mod verdict;

pub use admission::AdmissionController;
pub use classifier::VerdictClassifier;
pub use config::{ConfigLoader, JudgeboxConfig};
pub use errors::{AdmissionError, ConfigError, ProtocolError, SandboxError};
pub use executor::JobExecutor;
pub use job::{Job, JobMode};
pub use protocol::LogParser;
pub use sandbox::{SandboxOrchestrator, SandboxRuntime};
pub use verdict::{ResultCode, Verdict};
