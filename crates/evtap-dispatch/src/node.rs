//! Per-location event dispatcher.
//!
//! An [`EventNode`] sits at one instrumented program location and turns the
//! host's five call-ins into handler phases:
//!
//! - `on_enter` opens an activation and fires the pre phase right away when
//!   the construct takes no operands.
//! - `on_input_value` saves operands in order and fires the pre phase at the
//!   last one.
//! - `on_return_value` / `on_return_exceptional` close the activation and fire
//!   the post or exceptional phase.
//! - `on_unwind` discards every open activation and clears the relay.
//!
//! Call-ins never fail. Handler faults (including panics) are routed to the
//! [`ErrorReporter`](crate::ErrorReporter), which either swallows them or
//! terminates the process. A handler-supplied replacement comes back to the
//! host as [`Dispatch::Replace`]; the host performs the actual abort and
//! later reports it through `on_unwind`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use smallvec::SmallVec;

use evtap_core::{AnalysisError, ExecutionLocation, Fault, Value};

use crate::context::DispatchContext;
use crate::handler::{Handler, HandlerFactory, HandlerUpdate};

/// What the host must do after a call-in returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Proceed with normal evaluation.
    Continue,
    /// Abort the current evaluation and resume at the nearest enclosing
    /// handler of this abort with the carried value.
    Replace(Value),
}

impl Dispatch {
    pub fn replacement(self) -> Option<Value> {
        match self {
            Dispatch::Continue => None,
            Dispatch::Replace(v) => Some(v),
        }
    }
}

/// Operands saved for one activation, indexed by operand position.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    slots: SmallVec<[Option<Value>; 4]>,
}

impl InputBuffer {
    fn store(&mut self, index: usize, value: Value) {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(value);
    }

    /// Populated slots in index order. Operands never observed are skipped.
    pub fn populated(&self) -> Vec<Value> {
        self.slots.iter().flatten().cloned().collect()
    }
}

enum HandlerSlot {
    Active(Box<dyn Handler>),
    Deactivated,
}

/// Dispatcher for one instrumented program location.
pub struct EventNode {
    location: ExecutionLocation,
    handler: HandlerSlot,
    /// One buffer per `on_enter` not yet matched by a return. Its length is
    /// the reentrancy counter.
    activations: Vec<InputBuffer>,
}

impl fmt::Debug for EventNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNode")
            .field("location", &self.location)
            .field("handler", &self.handler_name())
            .field("activations", &self.activations.len())
            .finish()
    }
}

impl EventNode {
    /// Attaches `handler` at `location` and counts the location.
    pub fn attach(
        location: ExecutionLocation,
        handler: Box<dyn Handler>,
        ctx: &mut DispatchContext,
    ) -> Self {
        ctx.counters_mut().location_attached(location.kind);
        EventNode {
            location,
            handler: HandlerSlot::Active(handler),
            activations: Vec::new(),
        }
    }

    /// Attaches the handler `factory` builds for `location`.
    pub fn from_factory(
        location: ExecutionLocation,
        factory: &dyn HandlerFactory,
        ctx: &mut DispatchContext,
    ) -> Self {
        let handler = factory.create(&location);
        EventNode::attach(location, handler, ctx)
    }

    pub fn location(&self) -> &ExecutionLocation {
        &self.location
    }

    pub fn is_deactivated(&self) -> bool {
        matches!(self.handler, HandlerSlot::Deactivated)
    }

    /// Number of entered activations without a matching return.
    pub fn pending_activations(&self) -> usize {
        self.activations.len()
    }

    pub fn handler_name(&self) -> &str {
        match &self.handler {
            HandlerSlot::Active(h) => h.name(),
            HandlerSlot::Deactivated => "<deactivated>",
        }
    }

    // -----------------------------------------------------------------------
    // Call-ins
    // -----------------------------------------------------------------------

    pub fn on_enter(&mut self, ctx: &mut DispatchContext) {
        if !ctx.is_enabled() {
            return;
        }
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return;
        };
        self.activations.push(InputBuffer::default());

        if let Err(error) = guarded(|| handler.enter()) {
            ctx.reporter_mut().report(&self.location, None, &error);
            return;
        }

        if handler.is_last_index(self.location.input_count, None) {
            if let Some(discarded) = self.fire_pre(ctx) {
                tracing::debug!(
                    iid = %self.location.id,
                    "ignoring replacement {} from pre phase on enter",
                    discarded
                );
            }
        }
    }

    pub fn on_input_value(
        &mut self,
        ctx: &mut DispatchContext,
        index: usize,
        value: Value,
    ) -> Dispatch {
        if !ctx.is_enabled() {
            return Dispatch::Continue;
        }
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return Dispatch::Continue;
        };
        let Some(buffer) = self.activations.last_mut() else {
            tracing::debug!(iid = %self.location.id, index, "input without open activation");
            return Dispatch::Continue;
        };

        // A replaced child result reaches us before its abort does.
        let mut input = ctx.relay_mut().take().unwrap_or(value);
        let mut replacement = None;

        if handler.expected_inputs().accepts(index) {
            match guarded(|| handler.execute_on_input(index, &input)) {
                Ok(Some(new_input)) => {
                    input = new_input.clone();
                    replacement = Some(new_input);
                }
                Ok(None) => {}
                Err(error) => {
                    ctx.reporter_mut().report(&self.location, None, &error);
                }
            }
            buffer.store(index, input);
        }

        if handler.is_last_index(self.location.input_count, Some(index)) {
            if let Some(new_input) = self.fire_pre(ctx) {
                replacement = Some(new_input);
            }
        }

        match replacement {
            Some(value) => {
                ctx.relay_mut().publish(value.clone());
                Dispatch::Replace(value)
            }
            None => Dispatch::Continue,
        }
    }

    pub fn on_return_value(&mut self, ctx: &mut DispatchContext, result: &Value) -> Dispatch {
        if !ctx.is_enabled() {
            return Dispatch::Continue;
        }
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return Dispatch::Continue;
        };
        let Some(buffer) = self.activations.pop() else {
            return Dispatch::Continue;
        };
        let inputs = buffer.populated();

        ctx.counters_mut().post_hit(self.location.kind);
        match guarded(|| handler.execute_post(result, &inputs)) {
            Ok(replacement) => {
                self.check_handler_update(ctx);
                if let Some(value) = replacement {
                    ctx.relay_mut().publish(value.clone());
                    return Dispatch::Replace(value);
                }
            }
            Err(error) => {
                ctx.reporter_mut().report(&self.location, Some(&inputs), &error);
            }
        }
        Dispatch::Continue
    }

    pub fn on_return_exceptional(&mut self, ctx: &mut DispatchContext, fault: &Fault) -> Dispatch {
        if !ctx.is_enabled() {
            return Dispatch::Continue;
        }
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return Dispatch::Continue;
        };
        let Some(buffer) = self.activations.pop() else {
            return Dispatch::Continue;
        };
        // A faulting operand leaves its slot and every later one empty.
        let inputs = buffer.populated();

        ctx.counters_mut().exception_hit(self.location.kind);
        let outcome = match fault {
            Fault::Control(transfer) => {
                guarded(|| handler.execute_exceptional_ctrl_flow(transfer, &inputs).map(|()| None))
            }
            Fault::Program(program_fault) => {
                guarded(|| handler.execute_exceptional(program_fault, &inputs))
            }
        };

        match outcome {
            Ok(Some(value)) => {
                ctx.relay_mut().publish(value.clone());
                Dispatch::Replace(value)
            }
            Ok(None) => Dispatch::Continue,
            Err(error) => {
                ctx.reporter_mut().report(&self.location, Some(&inputs), &error);
                Dispatch::Continue
            }
        }
    }

    /// A non-local transfer passes through this node. Returns `carried`.
    pub fn on_unwind(&mut self, ctx: &mut DispatchContext, carried: Value) -> Value {
        // Cleared even while disabled.
        ctx.relay_mut().clear();
        if !ctx.is_enabled() {
            return carried;
        }
        self.activations.clear();
        carried
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Fires the pre phase on the innermost activation's saved inputs.
    fn fire_pre(&mut self, ctx: &mut DispatchContext) -> Option<Value> {
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return None;
        };
        let inputs = self
            .activations
            .last()
            .map(InputBuffer::populated)
            .unwrap_or_default();

        ctx.counters_mut().pre_hit(self.location.kind);
        match guarded(|| handler.execute_pre(&inputs)) {
            Ok(replacement) => {
                self.check_handler_update(ctx);
                replacement
            }
            Err(error) => {
                ctx.reporter_mut().report(&self.location, Some(&inputs), &error);
                None
            }
        }
    }

    /// Runs between dispatches only: the handler is not borrowed here.
    fn check_handler_update(&mut self, ctx: &mut DispatchContext) {
        let HandlerSlot::Active(handler) = &mut self.handler else {
            return;
        };
        let update = match guarded(|| Ok(handler.wants_to_update_handler())) {
            Ok(update) => update,
            Err(error) => {
                ctx.reporter_mut().report(&self.location, None, &error);
                return;
            }
        };

        match update {
            HandlerUpdate::Keep => {}
            HandlerUpdate::Replace(next) => {
                tracing::debug!(
                    iid = %self.location.id,
                    from = handler.name(),
                    to = next.name(),
                    "replacing handler"
                );
                self.handler = HandlerSlot::Active(next);
            }
            HandlerUpdate::Deactivate => {
                tracing::debug!(
                    "removing instrumentation for {} @ {}",
                    handler.name(),
                    self.location
                );
                self.handler = HandlerSlot::Deactivated;
                self.activations.clear();
                ctx.counters_mut().deactivated(self.location.kind);
            }
        }
    }
}

/// Runs handler code, converting a panic into an [`AnalysisError`].
fn guarded<T, F>(f: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(AnalysisError::Panicked { message })
        }
    }
}

#[cfg(test)]
mod tests;
