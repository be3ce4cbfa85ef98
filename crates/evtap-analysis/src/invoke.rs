//! Function calls and constructor calls.
//!
//! Operands arrive as `[receiver, function, args...]` for a call and as
//! `[function, args...]` for `new`. The receiver is cached when it arrives so
//! the input callback, which fires once per call on the function operand, can
//! report it alongside the callee. Call sites that keep hitting the same
//! callee are specialized into a [`MonomorphicInvokeHandler`], which hands
//! control back to the generic handler as soon as another callee shows up.

use evtap_core::{AnalysisError, ExecutionLocation, OperationKind, ProgramFault, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, Endpoints};
use crate::site::{input_or_undefined, Site};

/// Consecutive hits on one callee before a site is specialized.
pub const SPECIALIZE_AFTER: u32 = 4;

pub struct InvokeFactory {
    kind: OperationKind,
    endpoints: Endpoints,
}

impl InvokeFactory {
    /// Factory for plain calls.
    pub fn invoke(endpoints: Endpoints) -> Self {
        InvokeFactory {
            kind: OperationKind::Invoke,
            endpoints,
        }
    }

    /// Factory for constructor calls.
    pub fn new_call(endpoints: Endpoints) -> Self {
        InvokeFactory {
            kind: OperationKind::New,
            endpoints,
        }
    }
}

impl HandlerFactory for InvokeFactory {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        Box::new(InvokeHandler::new(CallSite {
            site: Site::new(location, &self.endpoints),
            is_new: self.kind == OperationKind::New,
            is_invoke: location.flag("isInvoke"),
            receiver: Value::Undefined,
        }))
    }
}

/// Operand layout and callback plumbing shared by both handler variants.
#[derive(Debug, Clone)]
struct CallSite {
    site: Site,
    is_new: bool,
    /// Method call: the receiver operand is a real object, not a filler.
    is_invoke: bool,
    /// Receiver of the activation whose operands are being delivered.
    receiver: Value,
}

impl CallSite {
    fn function_index(&self) -> usize {
        if self.is_new {
            0
        } else {
            1
        }
    }

    fn arg_offset(&self) -> usize {
        self.function_index() + 1
    }

    fn receiver(&self, inputs: &[Value]) -> Value {
        if self.is_new {
            Value::Undefined
        } else {
            input_or_undefined(inputs, 0)
        }
    }

    fn function(&self, inputs: &[Value]) -> Value {
        input_or_undefined(inputs, self.function_index())
    }

    fn arguments(&self, inputs: &[Value]) -> Value {
        Value::Array(inputs.iter().skip(self.arg_offset()).cloned().collect())
    }

    /// Like [`arguments`](Self::arguments), but `Undefined` when the fault
    /// struck before the callee was evaluated.
    fn arguments_so_far(&self, inputs: &[Value]) -> Value {
        if inputs.len() < self.arg_offset() {
            Value::Undefined
        } else {
            self.arguments(inputs)
        }
    }

    fn callee_name(&self, inputs: &[Value]) -> Option<String> {
        inputs
            .get(self.function_index())
            .and_then(Value::as_function)
            .map(|f| f.name.clone())
    }

    fn on_input(&mut self, index: usize, input: &Value) -> HandlerResult {
        if !self.is_new && index == 0 {
            self.receiver = input.clone();
            return Ok(None);
        }
        if index != self.function_index() {
            return Ok(None);
        }
        let is_async = input.as_function().is_some_and(|f| f.is_async);
        dispatch(&self.site.endpoints.on_input, || {
            self.site
                .args("invokeInput")
                .with("f", input.clone())
                .with("base", self.receiver.clone())
                .with("index", Value::Int(index as i64))
                .with("isConstructor", Value::Bool(self.is_new))
                .with("isAsync", Value::Bool(is_async))
        })
    }

    fn pre(&self, inputs: &[Value]) -> Result<(), AnalysisError> {
        dispatch(&self.site.endpoints.pre, || {
            self.site
                .args("invokeFunPre")
                .with("f", self.function(inputs))
                .with("base", self.receiver(inputs))
                .with("args", self.arguments(inputs))
                .with("isConstructor", Value::Bool(self.is_new))
                .with("isInvoke", Value::Bool(self.is_invoke))
        })
        .map(|_| ())
    }

    fn post(&self, result: &Value, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("invokeFun")
                .with("f", self.function(inputs))
                .with("base", self.receiver(inputs))
                .with("args", self.arguments(inputs))
                .with("result", result.clone())
                .with("isConstructor", Value::Bool(self.is_new))
                .with("isInvoke", Value::Bool(self.is_invoke))
        })
    }

    fn exceptional(&self, fault: &ProgramFault, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.on_exception, || {
            self.site
                .args("invokeException")
                .with("exception", fault.payload.clone())
                .with("f", self.function(inputs))
                .with("base", self.receiver(inputs))
                .with("args", self.arguments_so_far(inputs))
        })
    }
}

/// Handler for call sites that have not settled on one callee.
pub struct InvokeHandler {
    call: CallSite,
    last_callee: Option<String>,
    streak: u32,
}

impl InvokeHandler {
    fn new(call: CallSite) -> Self {
        InvokeHandler {
            call,
            last_callee: None,
            streak: 0,
        }
    }

    fn observe(&mut self, callee: Option<String>) {
        if callee.is_some() && callee == self.last_callee {
            self.streak += 1;
        } else {
            self.streak = u32::from(callee.is_some());
            self.last_callee = callee;
        }
    }
}

impl Handler for InvokeHandler {
    fn name(&self) -> &str {
        if self.call.is_new {
            "new"
        } else {
            "invoke"
        }
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Variable
    }

    fn execute_on_input(&mut self, index: usize, input: &Value) -> HandlerResult {
        self.call.on_input(index, input)
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        self.observe(self.call.callee_name(inputs));
        self.call.pre(inputs)?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        self.call.post(result, inputs)
    }

    fn execute_exceptional(&mut self, fault: &ProgramFault, inputs: &[Value]) -> HandlerResult {
        self.call.exceptional(fault, inputs)
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        if let HandlerUpdate::Deactivate = self.call.site.idle_update() {
            return HandlerUpdate::Deactivate;
        }
        match &self.last_callee {
            Some(callee) if self.streak >= SPECIALIZE_AFTER => {
                HandlerUpdate::Replace(Box::new(MonomorphicInvokeHandler {
                    call: self.call.clone(),
                    callee: callee.clone(),
                    diverged: false,
                }))
            }
            _ => HandlerUpdate::Keep,
        }
    }
}

/// Handler for a call site that has only ever seen `callee`.
pub struct MonomorphicInvokeHandler {
    call: CallSite,
    callee: String,
    diverged: bool,
}

impl Handler for MonomorphicInvokeHandler {
    fn name(&self) -> &str {
        "invoke (monomorphic)"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Variable
    }

    fn execute_on_input(&mut self, index: usize, input: &Value) -> HandlerResult {
        self.call.on_input(index, input)
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        if self.call.callee_name(inputs).as_deref() != Some(self.callee.as_str()) {
            self.diverged = true;
        }
        self.call.pre(inputs)?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        self.call.post(result, inputs)
    }

    fn execute_exceptional(&mut self, fault: &ProgramFault, inputs: &[Value]) -> HandlerResult {
        self.call.exceptional(fault, inputs)
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        if self.diverged {
            tracing::debug!(iid = %self.call.site.iid, callee = %self.callee, "call site went polymorphic");
            HandlerUpdate::Replace(Box::new(InvokeHandler::new(self.call.clone())))
        } else {
            HandlerUpdate::Keep
        }
    }
}
