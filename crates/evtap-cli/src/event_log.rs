//! The analysis the CLI attaches: print every event, flag tainted calls.

use std::cell::RefCell;
use std::rc::Rc;

use evtap_analysis::{callback, has_taint, Callback, CallbackArgs, Endpoints};
use evtap_core::Value;

/// How deep call arguments are searched for taint.
const TAINT_DEPTH: usize = 3;

/// Lines printed by the analysis, shared with the caller.
pub type EventSink = Rc<RefCell<Vec<String>>>;

fn logger(sink: &EventSink) -> Callback {
    let sink = Rc::clone(sink);
    callback(move |args: &CallbackArgs| {
        sink.borrow_mut().push(args.to_string());
        Ok(None)
    })
}

/// Post endpoint that also warns when tainted data reaches a call.
fn post_logger(sink: &EventSink, check_taint: bool) -> Callback {
    let sink = Rc::clone(sink);
    callback(move |args: &CallbackArgs| {
        sink.borrow_mut().push(args.to_string());
        if check_taint && args.callback == "invokeFun" {
            let tainted = args
                .get("args")
                .map(|a| has_taint(a, TAINT_DEPTH))
                .unwrap_or(false);
            if tainted {
                let callee = args.get("f").cloned().unwrap_or(Value::Undefined);
                tracing::warn!(iid = %args.iid, "tainted argument flows into {}", callee);
                sink.borrow_mut()
                    .push(format!("taint(iid={}, f={})", args.iid, callee));
            }
        }
        Ok(None)
    })
}

pub fn endpoints(sink: &EventSink, log_events: bool, check_taint: bool) -> Endpoints {
    let mut endpoints = Endpoints::new();
    if log_events {
        endpoints = endpoints
            .enter(logger(sink))
            .pre(logger(sink))
            .on_input(logger(sink))
            .on_exception(logger(sink));
    }
    if log_events || check_taint {
        endpoints = endpoints.post(post_logger(sink, check_taint));
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use evtap_core::{FunctionRef, LocationId};

    #[test]
    fn taint_is_flagged_on_call_post() {
        let sink = EventSink::default();
        let endpoints = endpoints(&sink, false, true);
        assert!(endpoints.pre.is_none());

        let post = endpoints.post.as_ref().unwrap();
        let tainted = Value::object([("__taint", Value::str("input"))]);
        let args = CallbackArgs::new("invokeFun", LocationId(3))
            .with("f", Value::Function(FunctionRef::new("str")))
            .with("args", Value::Array(vec![tainted]));
        post(&args).unwrap();

        let lines = sink.borrow();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "taint(iid=3, f=function str)");
    }

    #[test]
    fn nothing_requested_means_no_endpoints() {
        assert!(endpoints(&EventSink::default(), false, false).is_empty());
    }
}
