//! Loops and conditionals.

use evtap_core::{ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, notify, Endpoints};
use crate::site::{input_or_undefined, Site};

pub struct LoopFactory {
    endpoints: Endpoints,
}

impl LoopFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        LoopFactory { endpoints }
    }
}

impl HandlerFactory for LoopFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::Loop
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        let loop_type = location.attribute_str("loopType").unwrap_or("while");
        Box::new(LoopHandler {
            site: Site::new(location, &self.endpoints),
            loop_type: Value::str(loop_type),
        })
    }
}

/// Fires once per loop execution, not once per iteration.
pub struct LoopHandler {
    site: Site,
    loop_type: Value,
}

impl Handler for LoopHandler {
    fn name(&self) -> &str {
        "loop"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(0)
    }

    fn execute_pre(&mut self, _inputs: &[Value]) -> HandlerResult {
        notify(&self.site.endpoints.pre, || {
            self.site.args("loopPre").with("loopType", self.loop_type.clone())
        })?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, _inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("loop")
                .with("loopType", self.loop_type.clone())
                .with("result", result.clone())
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}

pub struct ConditionalFactory {
    endpoints: Endpoints,
}

impl ConditionalFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        ConditionalFactory { endpoints }
    }
}

impl HandlerFactory for ConditionalFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::Conditional
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        Box::new(ConditionalHandler {
            site: Site::new(location, &self.endpoints),
            // `if` statements are not conditional expressions (`a ? b : c`)
            is_conditional: location.flag("isConditional"),
        })
    }
}

pub struct ConditionalHandler {
    site: Site,
    is_conditional: bool,
}

impl Handler for ConditionalHandler {
    fn name(&self) -> &str {
        "conditional"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(1)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("conditional")
                .with("condition", input_or_undefined(inputs, 0))
                .with("result", result.clone())
                .with("isConditional", Value::Bool(self.is_conditional))
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}
