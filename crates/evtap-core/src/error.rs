//! Core error types for evtap-core.
//!
//! [`AnalysisError`] is what a handler phase returns when it fails. It splits
//! into guest-level exceptions thrown by analysis code (reported condensed,
//! never fatal) and analysis bugs (subject to the fatal-exit policy).

use thiserror::Error;

use crate::fault::ProgramFault;
use crate::id::LocationId;

/// Failure raised from inside handler or analysis callback code.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// The analysis callback threw a guest-level exception.
    #[error("analysis callback raised: {0}")]
    Raised(ProgramFault),

    /// The analysis logic failed.
    #[error("{message}")]
    Failed { message: String },

    /// Handler code panicked.
    #[error("handler panicked: {message}")]
    Panicked { message: String },
}

impl AnalysisError {
    pub fn failed(message: impl Into<String>) -> Self {
        AnalysisError::Failed {
            message: message.into(),
        }
    }

    /// True for exceptions raised at guest level, false for analysis bugs.
    pub fn is_program_level(&self) -> bool {
        matches!(self, AnalysisError::Raised(_))
    }
}

/// Errors for malformed setup of the data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two locations were attached with the same id.
    #[error("duplicate location: LocationId({id})", id = id.0)]
    DuplicateLocation { id: LocationId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_raised_is_program_level() {
        assert!(AnalysisError::Raised(ProgramFault::new("x")).is_program_level());
        assert!(!AnalysisError::failed("bug").is_program_level());
        assert!(!AnalysisError::Panicked {
            message: "p".into()
        }
        .is_program_level());
    }

    #[test]
    fn messages() {
        let e = AnalysisError::Panicked {
            message: "index out of bounds".into(),
        };
        assert_eq!(e.to_string(), "handler panicked: index out of bounds");
        let e = CoreError::DuplicateLocation { id: LocationId(9) };
        assert_eq!(e.to_string(), "duplicate location: LocationId(9)");
    }
}
