//! Errors that stop a host run.
//!
//! Guest exceptions caught by `try` never surface here; only faults that
//! escape the whole program, stray control transfers and resource limits do.

use evtap_core::{ControlTransfer, CoreError, LocationId, ProgramFault};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("uncaught exception: {0}")]
    Uncaught(ProgramFault),

    #[error("{0} outside of a loop")]
    StrayControl(ControlTransfer),

    #[error("loop at node {id} exceeded {limit} iterations")]
    LoopLimitExceeded { id: LocationId, limit: usize },

    #[error("eval nesting limit ({limit}) exceeded at node {id}")]
    CallDepthExceeded { id: LocationId, limit: usize },

    #[error("invalid program: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
