//! Verdict model and its wire representation
//!
//! A [`Verdict`] is either a classified outcome of the submitted code (one of
//! the [`ResultCode`]s) or an infrastructure failure. The two are mutually
//! exclusive, which the constructors enforce: there is no way to build a
//! verdict with both a result code and an infra error.
//!
//! The serialized form keeps the shape consumed by the API layer:
//! `{"code": "OK"|"CE"|"WA"|"TL"|"ML"|"", "stdout", "stderr", "test": int|"", "error"}`.

use serde::{Serialize, Serializer};
use std::fmt;

/// Stderr text attached to time-limit verdicts.
pub const TIMEOUT_DIAGNOSTIC: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    CompilationError,
    WrongAnswer,
    TimeLimit,
    /// Never produced by the current log protocol. An out-of-memory kill needs
    /// a dedicated signal from the container runtime before it can map here.
    MemoryLimit,
}

impl ResultCode {
    /// Short code used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::CompilationError => "CE",
            ResultCode::WrongAnswer => "WA",
            ResultCode::TimeLimit => "TL",
            ResultCode::MemoryLimit => "ML",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::CompilationError => "Compilation error",
            ResultCode::WrongAnswer => "Wrong answer",
            ResultCode::TimeLimit => "Time-limit exceeded",
            ResultCode::MemoryLimit => "Memory limit exceeded",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    #[serde(serialize_with = "serialize_code")]
    code: Option<ResultCode>,
    stdout: String,
    stderr: String,
    #[serde(serialize_with = "serialize_test")]
    test: Option<usize>,
    #[serde(serialize_with = "serialize_error")]
    error: Option<String>,
}

impl Verdict {
    fn classified(code: ResultCode, stdout: String, stderr: String, test: Option<usize>) -> Self {
        Self {
            code: Some(code),
            stdout,
            stderr,
            test,
            error: None,
        }
    }

    /// Every test passed.
    pub fn ok() -> Self {
        Self::classified(ResultCode::Ok, String::new(), String::new(), None)
    }

    /// A stdin run finished normally.
    pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
        Self::classified(ResultCode::Ok, stdout.into(), String::new(), None)
    }

    /// Test `test` produced the wrong answer. `test` is 1-based.
    pub fn wrong_answer(test: usize) -> Self {
        debug_assert!(test >= 1, "failing test index is 1-based");
        Self::classified(ResultCode::WrongAnswer, String::new(), String::new(), Some(test))
    }

    /// The code raised; `test` is `None` for stdin runs.
    pub fn compilation_error(test: Option<usize>, traceback: impl Into<String>) -> Self {
        debug_assert!(test != Some(0), "failing test index is 1-based");
        Self::classified(ResultCode::CompilationError, String::new(), traceback.into(), test)
    }

    /// The harness time budget fired; `test` is `None` for stdin runs.
    pub fn time_limit(test: Option<usize>) -> Self {
        debug_assert!(test != Some(0), "failing test index is 1-based");
        Self::classified(
            ResultCode::TimeLimit,
            String::new(),
            TIMEOUT_DIAGNOSTIC.to_string(),
            test,
        )
    }

    /// The engine failed before an outcome could be classified.
    pub fn infra_error(message: impl Into<String>) -> Self {
        Self {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
            test: None,
            error: Some(message.into()),
        }
    }

    pub fn code(&self) -> Option<ResultCode> {
        self.code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// 1-based index of the failing test, if any.
    pub fn failing_test(&self) -> Option<usize> {
        self.test
    }

    pub fn infra_error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_infra_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            log::error!("Failed to serialize verdict: {}", e);
            serde_json::Value::Null
        })
    }
}

fn serialize_code<S: Serializer>(code: &Option<ResultCode>, serializer: S) -> Result<S::Ok, S::Error> {
    match code {
        Some(code) => code.serialize(serializer),
        None => serializer.serialize_str(""),
    }
}

fn serialize_test<S: Serializer>(test: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
    match test {
        Some(index) => serializer.serialize_u64(*index as u64),
        None => serializer.serialize_str(""),
    }
}

fn serialize_error<S: Serializer>(error: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(error.as_deref().unwrap_or(""))
}
