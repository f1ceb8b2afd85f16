//! Job definitions submitted to the execution engine

use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobMode {
    Tests,
    Stdin,
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Tests => write!(f, "tests"),
            JobMode::Stdin => write!(f, "stdin"),
        }
    }
}

/// Mode-specific payload handed to the harness alongside the source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    /// Test specification understood by the grading harness.
    Tests(String),
    /// Text fed to the program's standard input.
    Stdin(String),
}

/// A single submission. Immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    id: Uuid,
    source_code: String,
    input: JobInput,
}

impl Job {
    pub fn tests(tests_spec: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_code: source_code.into(),
            input: JobInput::Tests(tests_spec.into()),
        }
    }

    pub fn stdin(stdin_text: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_code: source_code.into(),
            input: JobInput::Stdin(stdin_text.into()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> JobMode {
        match self.input {
            JobInput::Tests(_) => JobMode::Tests,
            JobInput::Stdin(_) => JobMode::Stdin,
        }
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    /// Text passed as the first harness argument.
    pub fn input_text(&self) -> &str {
        match &self.input {
            JobInput::Tests(text) | JobInput::Stdin(text) => text,
        }
    }
}
