//! Binary and logical operators.

use evtap_core::{AnalysisError, ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, notify, Endpoints};
use crate::site::{input_or_undefined, Site};

/// Operator name used when the host supplies none (`a ?? b` style nodes).
const UNDEFINED_OR: &str = "undefinedor";

pub struct BinaryFactory {
    endpoints: Endpoints,
}

impl BinaryFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        BinaryFactory { endpoints }
    }
}

impl HandlerFactory for BinaryFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::Binary
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        let op = location
            .attribute_str("operator")
            .unwrap_or(UNDEFINED_OR)
            .to_string();
        let is_logic = op == "&&" || op == "||";
        Box::new(BinaryHandler {
            site: Site::new(location, &self.endpoints),
            op,
            is_logic,
        })
    }
}

pub struct BinaryHandler {
    site: Site,
    op: String,
    /// `&&` and `||` may never evaluate their right operand.
    is_logic: bool,
}

impl Handler for BinaryHandler {
    fn name(&self) -> &str {
        "binary"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(2)
    }

    fn enter(&mut self) -> Result<(), AnalysisError> {
        notify(&self.site.endpoints.enter, || {
            self.site.args("binaryEnter").with("op", Value::str(&self.op))
        })
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        notify(&self.site.endpoints.pre, || {
            self.site
                .args("binaryPre")
                .with("op", Value::str(&self.op))
                .with("left", input_or_undefined(inputs, 0))
                .with("right", input_or_undefined(inputs, 1))
                .with("isLogic", Value::Bool(self.is_logic))
        })?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("binary")
                .with("op", Value::str(&self.op))
                .with("left", input_or_undefined(inputs, 0))
                .with("right", input_or_undefined(inputs, 1))
                .with("result", result.clone())
                .with("isLogic", Value::Bool(self.is_logic))
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use evtap_core::{LocationId, SourceSpan};

    use super::*;
    use crate::callback::{callback, CallbackArgs};

    fn location(op: Option<&str>) -> ExecutionLocation {
        let loc = ExecutionLocation::new(
            LocationId(5),
            OperationKind::Binary,
            SourceSpan::new("a.js", 2, 3),
            2,
        );
        match op {
            Some(op) => loc.with_attribute("operator", Value::str(op)),
            None => loc,
        }
    }

    #[test]
    fn post_receives_operands_and_result_and_may_replace() {
        let seen: Rc<RefCell<Vec<CallbackArgs>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let endpoints = Endpoints::new().post(callback(move |args| {
            sink.borrow_mut().push(args.clone());
            Ok(Some(Value::Int(0)))
        }));
        let mut handler = BinaryFactory::new(endpoints).create(&location(Some("+")));

        let replaced = handler
            .execute_post(&Value::Int(3), &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(replaced, Some(Value::Int(0)));

        let args = &seen.borrow()[0];
        assert_eq!(args.iid, LocationId(5));
        assert_eq!(args.get("op"), Some(&Value::str("+")));
        assert_eq!(args.get("right"), Some(&Value::Int(2)));
        assert_eq!(args.get("result"), Some(&Value::Int(3)));
        assert_eq!(args.get("isLogic"), Some(&Value::Bool(false)));
    }

    #[test]
    fn short_circuit_right_operand_is_undefined() {
        let seen: Rc<RefCell<Option<Value>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let endpoints = Endpoints::new().post(callback(move |args| {
            *sink.borrow_mut() = args.get("right").cloned();
            Ok(None)
        }));
        let mut handler = BinaryFactory::new(endpoints).create(&location(Some("&&")));
        handler.execute_post(&Value::Bool(false), &[Value::Bool(false)]).unwrap();
        assert_eq!(*seen.borrow(), Some(Value::Undefined));
    }

    #[test]
    fn pre_callback_result_is_not_a_substitution() {
        let endpoints = Endpoints::new().pre(callback(|_| Ok(Some(Value::Int(9)))));
        let mut handler = BinaryFactory::new(endpoints).create(&location(None));
        assert_eq!(handler.execute_pre(&[Value::Int(1), Value::Int(2)]).unwrap(), None);
    }

    #[test]
    fn missing_operator_falls_back() {
        let endpoints = Endpoints::new().enter(callback(|args| {
            assert_eq!(args.get("op"), Some(&Value::str(UNDEFINED_OR)));
            Ok(None)
        }));
        let mut handler = BinaryFactory::new(endpoints).create(&location(None));
        handler.enter().unwrap();
    }

    #[test]
    fn no_endpoints_deactivates() {
        let mut handler = BinaryFactory::new(Endpoints::new()).create(&location(Some("-")));
        assert_eq!(handler.execute_post(&Value::Int(1), &[]).unwrap(), None);
        assert!(matches!(handler.wants_to_update_handler(), HandlerUpdate::Deactivate));
    }
}
