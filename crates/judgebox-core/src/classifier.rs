//! Mapping from decoded harness signals to verdicts

use crate::protocol::{Diagnostic, ParsedSignal, StdinSignal, TestsSignal};
use crate::verdict::Verdict;

/// Pure and total: every signal maps to exactly one verdict.
///
/// `ResultCode::MemoryLimit` is intentionally absent. The harness cannot tell
/// an out-of-memory kill apart from its own timeout, so such runs surface as
/// `TL` or, when nothing was captured, as an infra error upstream.
pub struct VerdictClassifier;

impl VerdictClassifier {
    pub fn classify(signal: ParsedSignal) -> Verdict {
        match signal {
            ParsedSignal::Tests(signal) => Self::classify_tests(signal),
            ParsedSignal::Stdin(signal) => Self::classify_stdin(signal),
        }
    }

    pub fn classify_tests(signal: TestsSignal) -> Verdict {
        if signal.failing_test == 0 {
            return Verdict::ok();
        }
        let test = signal.failing_test;
        match signal.diagnostic {
            Diagnostic::Timeout => Verdict::time_limit(Some(test)),
            Diagnostic::Traceback(traceback) => Verdict::compilation_error(Some(test), traceback),
            Diagnostic::None => Verdict::wrong_answer(test),
        }
    }

    pub fn classify_stdin(signal: StdinSignal) -> Verdict {
        match signal.diagnostic {
            Diagnostic::Timeout => Verdict::time_limit(None),
            Diagnostic::Traceback(traceback) => Verdict::compilation_error(None, traceback),
            Diagnostic::None => Verdict::ok_with_stdout(signal.stdout),
        }
    }
}
