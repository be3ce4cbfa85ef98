//! Dynamic code evaluation.

use evtap_core::{ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, notify, Endpoints};
use crate::site::{input_or_undefined, Site};

pub struct EvalFactory {
    endpoints: Endpoints,
}

impl EvalFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        EvalFactory { endpoints }
    }
}

impl HandlerFactory for EvalFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::Eval
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        Box::new(EvalHandler {
            site: Site::new(location, &self.endpoints),
        })
    }
}

pub struct EvalHandler {
    site: Site,
}

impl Handler for EvalHandler {
    fn name(&self) -> &str {
        "eval"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(1)
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        notify(&self.site.endpoints.pre, || {
            self.site
                .args("evalPre")
                .with("code", input_or_undefined(inputs, 0))
        })?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("evalPost")
                .with("code", input_or_undefined(inputs, 0))
                .with("result", result.clone())
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}

#[cfg(test)]
mod tests {
    use evtap_core::{LocationId, SourceSpan};

    use super::*;
    use crate::callback::callback;

    #[test]
    fn post_sees_code_and_result() {
        let endpoints = Endpoints::new().post(callback(|args| {
            assert_eq!(args.get("code"), Some(&Value::str("1+1")));
            assert_eq!(args.get("result"), Some(&Value::Int(2)));
            Ok(Some(Value::Int(3)))
        }));
        let loc = ExecutionLocation::new(LocationId(1), OperationKind::Eval, SourceSpan::default(), 1);
        let mut handler = EvalFactory::new(endpoints).create(&loc);
        assert_eq!(
            handler.execute_post(&Value::Int(2), &[Value::str("1+1")]).unwrap(),
            Some(Value::Int(3))
        );
    }
}
