//! Literal expressions.

use evtap_core::{ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, Endpoints};
use crate::site::Site;

pub struct LiteralFactory {
    endpoints: Endpoints,
}

impl LiteralFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        LiteralFactory { endpoints }
    }
}

impl HandlerFactory for LiteralFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::Literal
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        Box::new(LiteralHandler {
            site: Site::new(location, &self.endpoints),
        })
    }
}

pub struct LiteralHandler {
    site: Site,
}

impl Handler for LiteralHandler {
    fn name(&self) -> &str {
        "literal"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(0)
    }

    fn execute_post(&mut self, result: &Value, _inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site.args("literal").with("val", result.clone())
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}
