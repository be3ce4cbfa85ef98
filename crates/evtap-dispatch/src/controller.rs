//! Process-wide enable/disable gate for all event dispatch.

/// Enable/disable gate consulted at the start of every call-in.
///
/// Toggling takes effect for call-ins issued after the call. An activation
/// that began while disabled stays undispatched even if the gate opens before
/// it completes.
#[derive(Debug, Clone)]
pub struct InstrumentationController {
    enabled: bool,
}

impl Default for InstrumentationController {
    fn default() -> Self {
        InstrumentationController { enabled: true }
    }
}

impl InstrumentationController {
    pub fn new(enabled: bool) -> Self {
        InstrumentationController { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Idempotent.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::debug!(enabled, "instrumentation gate toggled");
        }
        self.enabled = enabled;
    }
}
