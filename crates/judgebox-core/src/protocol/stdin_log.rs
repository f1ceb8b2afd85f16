//! Stdin-mode log decoding

use super::{
    lines, Diagnostic, LogParser, StdinSignal, ERROR_MARKER, OUTPUT_MARKER, SILENT_ERROR_DIAGNOSTIC,
    TIMEOUT_MARKER,
};
use crate::errors::ProtocolError;

impl LogParser {
    /// Decode a stdin-mode log. The first framing line found decides the
    /// outcome; the program's stdout is returned verbatim.
    pub fn parse_stdin(&self, log: &str) -> Result<StdinSignal, ProtocolError> {
        if log.trim().is_empty() {
            return Err(ProtocolError::EmptyLog);
        }

        for line in lines(log) {
            let rest = &log[line.next..];
            if line.text == OUTPUT_MARKER {
                return Ok(StdinSignal {
                    stdout: rest.to_string(),
                    diagnostic: Diagnostic::None,
                });
            }
            if line.text == ERROR_MARKER {
                // A program that exits non-zero without writing to stderr
                // still failed.
                let diagnostic = match self.diagnostic_block(rest) {
                    Diagnostic::None => Diagnostic::Traceback(SILENT_ERROR_DIAGNOSTIC.to_string()),
                    diagnostic => diagnostic,
                };
                return Ok(StdinSignal {
                    stdout: String::new(),
                    diagnostic,
                });
            }
            if line.text.ends_with(TIMEOUT_MARKER) {
                return Ok(StdinSignal {
                    stdout: String::new(),
                    diagnostic: Diagnostic::Timeout,
                });
            }
        }

        Err(ProtocolError::MalformedLog("unknown stdout format".to_string()))
    }
}
