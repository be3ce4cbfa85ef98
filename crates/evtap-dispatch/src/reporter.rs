//! Fault reporting and the fatal-exit policy for analysis bugs.
//!
//! Guest-level exceptions thrown by analysis code get a condensed one-line
//! report so analysis authors do not see runtime internals. Anything else is
//! an analysis bug: it is logged with every saved input and, unless the
//! ignore switch is set, terminates the process after dumping diagnostics.

use std::backtrace::Backtrace;

use evtap_core::{AnalysisError, ExecutionLocation, Value};

/// Exit status used when an analysis fault terminates the process.
pub const FATAL_EXIT_CODE: i32 = 255;

/// Process termination primitive. Tests substitute a panicking function.
pub type TerminateFn = fn(i32);

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// How a reported fault was disposed of, when it did not terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reported {
    /// Guest-level exception: condensed message only.
    Condensed,
    /// Analysis bug logged and swallowed under the ignore switch.
    Swallowed,
}

/// Formats faults escaping handler code and enforces the fatal-exit policy.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    ignore_analysis_faults: bool,
    terminate: TerminateFn,
    reported: u64,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        ErrorReporter::new(false)
    }
}

impl ErrorReporter {
    pub fn new(ignore_analysis_faults: bool) -> Self {
        ErrorReporter {
            ignore_analysis_faults,
            terminate: exit_process,
            reported: 0,
        }
    }

    /// Replaces the termination primitive.
    pub fn with_terminate(mut self, terminate: TerminateFn) -> Self {
        self.terminate = terminate;
        self
    }

    pub fn ignores_analysis_faults(&self) -> bool {
        self.ignore_analysis_faults
    }

    pub fn set_ignore_analysis_faults(&mut self, ignore: bool) {
        self.ignore_analysis_faults = ignore;
    }

    /// Number of faults reported so far, fatal ones excluded.
    pub fn reported_count(&self) -> u64 {
        self.reported
    }

    /// Reports a fault raised by handler code at `location`.
    ///
    /// Returns only when the fault is not fatal under the current policy.
    pub fn report(
        &mut self,
        location: &ExecutionLocation,
        inputs: Option<&[Value]>,
        error: &AnalysisError,
    ) -> Reported {
        if error.is_program_level() {
            tracing::warn!(
                iid = %location.id,
                span = %location.span,
                "exception in analysis callback: {}",
                error
            );
            self.reported += 1;
            return Reported::Condensed;
        }

        let input_count = inputs.map_or_else(|| "null".to_string(), |i| i.len().to_string());
        tracing::error!(
            iid = %location.id,
            span = %location.span,
            "{} inputs: {} exception: {}",
            location.kind,
            input_count,
            error
        );
        for (i, input) in inputs.unwrap_or_default().iter().enumerate() {
            tracing::error!(iid = %location.id, span = %location.span, "\targ[{}]: {}", i, input);
        }

        if self.ignore_analysis_faults {
            self.reported += 1;
            return Reported::Swallowed;
        }

        tracing::error!(
            iid = %location.id,
            diagnostics = ?error,
            "analysis fault is fatal, terminating\n{}",
            Backtrace::force_capture()
        );
        (self.terminate)(FATAL_EXIT_CODE);
        std::process::exit(FATAL_EXIT_CODE)
    }
}
