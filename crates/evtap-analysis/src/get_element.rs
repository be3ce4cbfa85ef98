//! Computed property reads (`obj[key]`).

use evtap_core::{ExecutionLocation, OperationKind, Value};
use evtap_dispatch::{Arity, Handler, HandlerFactory, HandlerResult, HandlerUpdate};

use crate::callback::{dispatch, notify, Endpoints};
use crate::site::{input_or_undefined, Site};

pub struct GetElementFactory {
    endpoints: Endpoints,
}

impl GetElementFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        GetElementFactory { endpoints }
    }
}

impl HandlerFactory for GetElementFactory {
    fn kind(&self) -> OperationKind {
        OperationKind::GetElement
    }

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler> {
        Box::new(GetElementHandler {
            site: Site::new(location, &self.endpoints),
        })
    }
}

pub struct GetElementHandler {
    site: Site,
}

impl Handler for GetElementHandler {
    fn name(&self) -> &str {
        "getElement"
    }

    fn expected_inputs(&self) -> Arity {
        Arity::Fixed(2)
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        notify(&self.site.endpoints.pre, || {
            self.site
                .args("getFieldPre")
                .with("base", input_or_undefined(inputs, 0))
                .with("offset", input_or_undefined(inputs, 1))
        })?;
        Ok(None)
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        dispatch(&self.site.endpoints.post, || {
            self.site
                .args("getField")
                .with("base", input_or_undefined(inputs, 0))
                .with("offset", input_or_undefined(inputs, 1))
                .with("val", result.clone())
        })
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        self.site.idle_update()
    }
}
