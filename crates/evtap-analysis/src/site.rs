//! State shared by every handler in this crate.

use evtap_core::{ExecutionLocation, LocationId, Value};
use evtap_dispatch::HandlerUpdate;

use crate::callback::{CallbackArgs, Endpoints};

/// One location's identity plus the endpoints its handler dispatches to.
#[derive(Debug, Clone)]
pub(crate) struct Site {
    pub iid: LocationId,
    pub endpoints: Endpoints,
}

impl Site {
    pub fn new(location: &ExecutionLocation, endpoints: &Endpoints) -> Self {
        Site {
            iid: location.id,
            endpoints: endpoints.clone(),
        }
    }

    pub fn args(&self, callback: &'static str) -> CallbackArgs {
        CallbackArgs::new(callback, self.iid)
    }

    /// Nothing to observe: stop instrumenting the location.
    pub fn idle_update(&self) -> HandlerUpdate {
        if self.endpoints.is_empty() {
            HandlerUpdate::Deactivate
        } else {
            HandlerUpdate::Keep
        }
    }
}

/// The operand at `index`, or `Undefined` when it was never observed.
pub(crate) fn input_or_undefined(inputs: &[Value], index: usize) -> Value {
    inputs.get(index).cloned().unwrap_or(Value::Undefined)
}
