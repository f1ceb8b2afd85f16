//! Harness-to-host execution log protocol
//!
//! The harness running inside the sandbox reports its results as plain text on
//! its combined output. Two dialects exist, one per job mode:
//!
//! - **Tests**: one line-leading marker per test, in execution order:
//!   `[PASSED] <label>`, `[FAILED] <label>` or `[ERROR] <label>` followed by a
//!   traceback block. When the harness' time budget kills a test, the shell
//!   prints `Terminated` on the line right before the `[ERROR]` marker.
//! - **Stdin**: exactly one framed block, `[OUTPUT]` followed by the program's
//!   stdout, `[ERROR]` followed by a traceback (possibly empty), or `Terminated`.
//!
//! Both parsers are forward-only line scanners over this fixed vocabulary.
//! Diagnostic blocks are capped at [`LogParser::max_diagnostic_bytes`] so a
//! misbehaving program cannot push arbitrarily large tracebacks into a verdict.

pub mod stdin_log;
pub mod tests_log;

use crate::errors::ProtocolError;
use crate::job::JobMode;

pub const PASSED_MARKER: &str = "[PASSED]";
pub const FAILED_MARKER: &str = "[FAILED]";
pub const ERROR_MARKER: &str = "[ERROR]";
pub const OUTPUT_MARKER: &str = "[OUTPUT]";
pub const TIMEOUT_MARKER: &str = "Terminated";

/// Stands in for the traceback of a stdin run that failed without any stderr.
pub const SILENT_ERROR_DIAGNOSTIC: &str = "program exited with an error and no traceback";

pub const DEFAULT_MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// What the harness reported about the submitted code, beyond pass/fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    None,
    Timeout,
    Traceback(String),
}

/// Decoded tests-mode log. `failing_test == 0` means every test passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestsSignal {
    pub failing_test: usize,
    pub diagnostic: Diagnostic,
}

impl TestsSignal {
    pub fn all_passed() -> Self {
        Self {
            failing_test: 0,
            diagnostic: Diagnostic::None,
        }
    }
}

/// Decoded stdin-mode log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdinSignal {
    pub stdout: String,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSignal {
    Tests(TestsSignal),
    Stdin(StdinSignal),
}

/// Stateless log decoder. Cheap to clone and share between workers.
#[derive(Debug, Clone, Copy)]
pub struct LogParser {
    max_diagnostic_bytes: usize,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIAGNOSTIC_BYTES)
    }
}

impl LogParser {
    pub fn new(max_diagnostic_bytes: usize) -> Self {
        Self {
            max_diagnostic_bytes,
        }
    }

    pub fn max_diagnostic_bytes(&self) -> usize {
        self.max_diagnostic_bytes
    }

    /// Decode `log` using the dialect of `mode`.
    pub fn parse(&self, mode: JobMode, log: &str) -> Result<ParsedSignal, ProtocolError> {
        match mode {
            JobMode::Tests => self.parse_tests(log).map(ParsedSignal::Tests),
            JobMode::Stdin => self.parse_stdin(log).map(ParsedSignal::Stdin),
        }
    }

    /// Turn a raw block into a diagnostic, dropping trailing whitespace and
    /// capping its size.
    fn diagnostic_block(&self, block: &str) -> Diagnostic {
        let block = block.trim_end();
        if block.is_empty() {
            Diagnostic::None
        } else {
            Diagnostic::Traceback(truncate_at_char_boundary(block, self.max_diagnostic_bytes).to_string())
        }
    }
}

/// A single line of a log with its byte span in the original text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// Line content without the terminator (`\n` or `\r\n`).
    pub text: &'a str,
    /// Offset of the first byte after the terminator.
    pub next: usize,
}

pub(crate) fn lines(log: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    log.split_inclusive('\n').map(move |raw| {
        offset += raw.len();
        let text = raw.strip_suffix('\n').unwrap_or(raw);
        let text = text.strip_suffix('\r').unwrap_or(text);
        Line { text, next: offset }
    })
}

/// True when `line` starts with `marker` followed by nothing or whitespace.
pub(crate) fn is_marker_line(line: &str, marker: &str) -> bool {
    match line.strip_prefix(marker) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

pub(crate) fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
