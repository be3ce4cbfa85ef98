//! Single-slot channel for a pending value substitution.
//!
//! When a handler replaces a construct's result, the host aborts the real
//! evaluation, but the parent's input event for that operand is delivered
//! before the abort is observed at the parent. The relay carries the
//! replacement across that gap: the producer publishes, the parent's input
//! event takes it, and every unwind clears it.

use evtap_core::Value;

/// Holds at most one pending substitution.
#[derive(Debug, Clone, Default)]
pub struct ValueRelay {
    slot: Option<Value>,
}

impl ValueRelay {
    pub fn new() -> Self {
        ValueRelay::default()
    }

    /// Read-and-clear.
    pub fn take(&mut self) -> Option<Value> {
        self.slot.take()
    }

    /// Publishes a substitution, overwriting any previous occupant.
    pub fn publish(&mut self, value: Value) {
        self.slot = Some(value);
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.slot.as_ref()
    }
}
