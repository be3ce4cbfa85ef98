//! Execution trace recording.

use evtap_core::{LocationId, Value};

/// One node evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub id: LocationId,
    pub construct: &'static str,
    /// `None` when the node completed abnormally.
    pub output: Option<Value>,
}
