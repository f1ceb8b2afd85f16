//! Tests-mode log decoding

use super::{
    is_marker_line, lines, Diagnostic, LogParser, TestsSignal, ERROR_MARKER, FAILED_MARKER,
    PASSED_MARKER, TIMEOUT_MARKER,
};
use crate::errors::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestMarker {
    Passed,
    Failed,
    Error,
}

impl TestMarker {
    fn of(line: &str) -> Option<Self> {
        if is_marker_line(line, PASSED_MARKER) {
            Some(TestMarker::Passed)
        } else if is_marker_line(line, FAILED_MARKER) {
            Some(TestMarker::Failed)
        } else if is_marker_line(line, ERROR_MARKER) {
            Some(TestMarker::Error)
        } else {
            None
        }
    }
}

impl LogParser {
    /// Decode a tests-mode log. The first `[FAILED]` or `[ERROR]` wins; tests
    /// after it are never inspected.
    ///
    /// An empty log means the harness never reported anything, which is an
    /// infrastructure failure rather than "zero tests failed".
    pub fn parse_tests(&self, log: &str) -> Result<TestsSignal, ProtocolError> {
        if log.trim().is_empty() {
            return Err(ProtocolError::EmptyLog);
        }

        let mut index = 0;
        let mut previous: Option<&str> = None;
        let mut scanner = lines(log);

        while let Some(line) = scanner.next() {
            match TestMarker::of(line.text) {
                Some(TestMarker::Passed) => index += 1,
                Some(TestMarker::Failed) => {
                    return Ok(TestsSignal {
                        failing_test: index + 1,
                        diagnostic: Diagnostic::None,
                    });
                }
                Some(TestMarker::Error) => {
                    let failing_test = index + 1;
                    if previous.is_some_and(|p| p.ends_with(TIMEOUT_MARKER)) {
                        return Ok(TestsSignal {
                            failing_test,
                            diagnostic: Diagnostic::Timeout,
                        });
                    }

                    // Traceback runs until the next marker line or the end of the log.
                    let start = line.next;
                    let mut end = log.len();
                    let mut cursor = start;
                    for block_line in scanner.by_ref() {
                        if TestMarker::of(block_line.text).is_some() {
                            end = cursor;
                            break;
                        }
                        cursor = block_line.next;
                    }

                    return Ok(TestsSignal {
                        failing_test,
                        diagnostic: self.diagnostic_block(&log[start..end]),
                    });
                }
                None => {}
            }
            previous = Some(line.text);
        }

        Ok(TestsSignal::all_passed())
    }
}
