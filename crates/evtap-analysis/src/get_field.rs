//! Named property reads (`obj.prop`).

use evtap_core::{ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, notify, Endpoints};
use crate::site::{input_or_undefined, Site};

/// Own property marking the global object.
pub const GLOBAL_MARKER: &str = "__global";

fn is_global(receiver: &Value) -> bool {
    receiver
        .get_own(GLOBAL_MARKER)
        .map(Value::is_truthy)
        .unwrap_or(false)
}

pub struct GetFieldFactory {
    endpoints: Endpoints,
}

impl GetFieldFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        GetFieldFactory { endpoints }
    }
}

impl HandlerFactory for GetFieldFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::GetField
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        let property = location
            .attribute("property")
            .cloned()
            .unwrap_or(Value::Undefined);
        Box::new(GetFieldHandler {
            site: Site::new(location, &self.endpoints),
            property,
        })
    }
}

pub struct GetFieldHandler {
    site: Site,
    property: Value,
}

impl Handler for GetFieldHandler {
    fn name(&self) -> &str {
        "getField"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(1)
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        let receiver = input_or_undefined(inputs, 0);
        if is_global(&receiver) {
            return Ok(None);
        }
        notify(&self.site.endpoints.pre, || {
            self.site
                .args("getFieldPre")
                .with("base", receiver.clone())
                .with("offset", self.property.clone())
        })?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        let receiver = input_or_undefined(inputs, 0);
        if is_global(&receiver) {
            return Ok(None);
        }
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("getField")
                .with("base", receiver.clone())
                .with("offset", self.property.clone())
                .with("val", result.clone())
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use evtap_core::{LocationId, SourceSpan};

    use super::*;
    use crate::callback::callback;

    fn location() -> ExecutionLocation {
        ExecutionLocation::new(LocationId(2), OperationKind::GetField, SourceSpan::default(), 1)
            .with_attribute("property", Value::str("x"))
    }

    #[test]
    fn dispatches_property_and_value() {
        let endpoints = Endpoints::new().post(callback(|args| {
            assert_eq!(args.get("offset"), Some(&Value::str("x")));
            assert_eq!(args.get("val"), Some(&Value::Int(1)));
            Ok(None)
        }));
        let mut handler = GetFieldFactory::new(endpoints).create(&location());
        let receiver = Value::object([("x", Value::Int(1))]);
        handler.execute_post(&Value::Int(1), &[receiver]).unwrap();
    }

    #[test]
    fn global_receiver_is_skipped() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let endpoints = Endpoints::new().pre(callback(move |_| {
            counter.set(counter.get() + 1);
            Ok(None)
        }));
        let mut handler = GetFieldFactory::new(endpoints).create(&location());
        let global = Value::object([(GLOBAL_MARKER, Value::Bool(true))]);
        handler.execute_pre(&[global]).unwrap();
        handler.execute_pre(&[Value::object([("x", Value::Int(1))])]).unwrap();
        assert_eq!(calls.get(), 1);
    }
}
