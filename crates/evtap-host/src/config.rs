//! Host interpreter limits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum nesting of `eval` calls.
    pub max_call_depth: usize,
    /// Iterations one `while` may run before the host gives up.
    pub max_loop_iterations: usize,
    /// Record a [`TraceEntry`](crate::TraceEntry) per evaluated node.
    pub trace_enabled: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            max_call_depth: 64,
            max_loop_iterations: 10_000,
            trace_enabled: false,
        }
    }
}
