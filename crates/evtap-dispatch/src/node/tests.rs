use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;

use evtap_core::{
    AnalysisError, ControlTransfer, ExecutionLocation, Fault, LocationId, OperationKind,
    ProgramFault, SourceSpan, Value,
};

use super::*;
use crate::config::DispatchConfig;
use crate::handler::{Arity, HandlerResult};
use crate::reporter::ErrorReporter;

/// One observed handler invocation.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Enter,
    Input(usize, Value),
    Pre(Vec<Value>),
    Post(Value, Vec<Value>),
    Exceptional(String, Vec<Value>),
    CtrlFlow(Vec<Value>),
}

type Log = Rc<RefCell<Vec<Call>>>;

#[derive(Clone, Copy, PartialEq)]
enum Plan {
    Keep,
    DeactivateAfterPost,
    SpecializeAfterPre,
}

/// Scriptable handler that records every phase it sees.
struct Recorder {
    log: Log,
    arity: Arity,
    input_replacements: HashMap<usize, Value>,
    pre_replacement: Option<Value>,
    post_replacement: Option<Value>,
    exceptional_replacement: Option<Value>,
    fail_post: Option<AnalysisError>,
    panic_pre: bool,
    plan: Plan,
    posts_seen: usize,
    pres_seen: usize,
}

impl Recorder {
    fn new(log: &Log, arity: Arity) -> Self {
        Recorder {
            log: Rc::clone(log),
            arity,
            input_replacements: HashMap::new(),
            pre_replacement: None,
            post_replacement: None,
            exceptional_replacement: None,
            fail_post: None,
            panic_pre: false,
            plan: Plan::Keep,
            posts_seen: 0,
            pres_seen: 0,
        }
    }

    fn push(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl Handler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn expected_inputs(&self) -> Arity {
        self.arity
    }

    fn enter(&mut self) -> Result<(), AnalysisError> {
        self.push(Call::Enter);
        Ok(())
    }

    fn execute_on_input(&mut self, index: usize, input: &Value) -> HandlerResult {
        self.push(Call::Input(index, input.clone()));
        Ok(self.input_replacements.get(&index).cloned())
    }

    fn execute_pre(&mut self, inputs: &[Value]) -> HandlerResult {
        if self.panic_pre {
            panic!("pre exploded");
        }
        self.pres_seen += 1;
        self.push(Call::Pre(inputs.to_vec()));
        Ok(self.pre_replacement.clone())
    }

    fn execute_post(&mut self, result: &Value, inputs: &[Value]) -> HandlerResult {
        self.posts_seen += 1;
        self.push(Call::Post(result.clone(), inputs.to_vec()));
        if let Some(error) = self.fail_post.clone() {
            return Err(error);
        }
        Ok(self.post_replacement.clone())
    }

    fn execute_exceptional(&mut self, fault: &ProgramFault, inputs: &[Value]) -> HandlerResult {
        self.push(Call::Exceptional(fault.message.clone(), inputs.to_vec()));
        Ok(self.exceptional_replacement.clone())
    }

    fn execute_exceptional_ctrl_flow(
        &mut self,
        _transfer: &ControlTransfer,
        inputs: &[Value],
    ) -> Result<(), AnalysisError> {
        self.push(Call::CtrlFlow(inputs.to_vec()));
        Ok(())
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        match self.plan {
            Plan::DeactivateAfterPost if self.posts_seen > 0 => HandlerUpdate::Deactivate,
            Plan::SpecializeAfterPre if self.pres_seen > 0 => {
                let mut next = Recorder::new(&self.log, self.arity);
                next.post_replacement = Some(Value::str("specialized"));
                HandlerUpdate::Replace(Box::new(next))
            }
            _ => HandlerUpdate::Keep,
        }
    }
}

fn panic_on_exit(code: i32) {
    panic!("terminated with {}", code)
}

fn context() -> DispatchContext {
    DispatchContext::new(DispatchConfig::default())
        .with_reporter(ErrorReporter::new(false).with_terminate(panic_on_exit))
}

fn location(kind: OperationKind, input_count: usize) -> ExecutionLocation {
    ExecutionLocation::new(LocationId(1), kind, SourceSpan::new("test.js", 1, 1), input_count)
}

fn node_with(recorder: Recorder, input_count: usize, ctx: &mut DispatchContext) -> EventNode {
    EventNode::attach(location(OperationKind::Binary, input_count), Box::new(recorder), ctx)
}

fn calls(log: &Log) -> Vec<Call> {
    log.borrow().clone()
}

#[test]
fn attach_counts_location() {
    let mut ctx = context();
    let log = Log::default();
    node_with(Recorder::new(&log, Arity::Fixed(2)), 2, &mut ctx);
    node_with(Recorder::new(&log, Arity::Fixed(2)), 2, &mut ctx);
    assert_eq!(ctx.counters().get(OperationKind::Binary).location_count, 2);
}

#[test]
fn zero_input_construct_fires_pre_on_enter_then_post() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(0)), 0, &mut ctx);

    node.on_enter(&mut ctx);
    let dispatch = node.on_return_value(&mut ctx, &Value::Int(42));

    assert_eq!(dispatch, Dispatch::Continue);
    assert_eq!(
        calls(&log),
        vec![
            Call::Enter,
            Call::Pre(vec![]),
            Call::Post(Value::Int(42), vec![]),
        ]
    );
    let counters = ctx.counters().get(OperationKind::Binary);
    assert_eq!((counters.pre_hits, counters.post_hits), (1, 1));
}

#[test]
fn input_substitution_flows_into_saved_buffer() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(2));
    recorder.input_replacements.insert(0, Value::Int(5));
    let mut node = node_with(recorder, 2, &mut ctx);
    let operand_log = Log::default();
    let mut operand = node_with(Recorder::new(&operand_log, Arity::Fixed(0)), 0, &mut ctx);

    node.on_enter(&mut ctx);
    let first = node.on_input_value(&mut ctx, 0, Value::Int(1));
    assert_eq!(first, Dispatch::Replace(Value::Int(5)));
    assert_eq!(ctx.relay().peek(), Some(&Value::Int(5)));

    // The host aborts the operand's evaluation; its node sees the unwind.
    assert_eq!(operand.on_unwind(&mut ctx, Value::Int(5)), Value::Int(5));
    assert!(!ctx.relay().is_pending());

    assert_eq!(node.on_input_value(&mut ctx, 1, Value::Int(2)), Dispatch::Continue);
    node.on_return_value(&mut ctx, &Value::Int(7));

    assert_eq!(
        calls(&log),
        vec![
            Call::Enter,
            Call::Input(0, Value::Int(1)),
            Call::Input(1, Value::Int(2)),
            Call::Pre(vec![Value::Int(5), Value::Int(2)]),
            Call::Post(Value::Int(7), vec![Value::Int(5), Value::Int(2)]),
        ]
    );
}

#[test]
fn inputs_beyond_fixed_arity_are_not_saved() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(1)), 3, &mut ctx);

    node.on_enter(&mut ctx);
    node.on_input_value(&mut ctx, 0, Value::Int(1));
    node.on_input_value(&mut ctx, 1, Value::Int(2));
    node.on_input_value(&mut ctx, 2, Value::Int(3));
    node.on_return_value(&mut ctx, &Value::Null);

    assert_eq!(
        calls(&log),
        vec![
            Call::Enter,
            Call::Input(0, Value::Int(1)),
            Call::Pre(vec![Value::Int(1)]),
            Call::Post(Value::Null, vec![Value::Int(1)]),
        ]
    );
}

#[test]
fn variable_arity_fires_pre_at_host_declared_last_operand() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Variable), 3, &mut ctx);

    node.on_enter(&mut ctx);
    for i in 0..3 {
        node.on_input_value(&mut ctx, i, Value::Int(i as i64));
    }
    let pres: Vec<_> = calls(&log)
        .into_iter()
        .filter(|c| matches!(c, Call::Pre(_)))
        .collect();
    assert_eq!(
        pres,
        vec![Call::Pre(vec![Value::Int(0), Value::Int(1), Value::Int(2)])]
    );
}

#[test]
fn pending_relay_value_overrides_observed_input() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(2)), 2, &mut ctx);

    node.on_enter(&mut ctx);
    ctx.relay_mut().publish(Value::Int(10));
    node.on_input_value(&mut ctx, 0, Value::Int(3));
    node.on_input_value(&mut ctx, 1, Value::Int(4));

    assert!(calls(&log).contains(&Call::Input(0, Value::Int(10))));
    assert!(calls(&log).contains(&Call::Pre(vec![Value::Int(10), Value::Int(4)])));
    assert!(!ctx.relay().is_pending());
}

#[test]
fn post_replacement_requests_one_transfer_and_unwind_clears_relay() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.post_replacement = Some(Value::Int(99));
    let mut node = node_with(recorder, 0, &mut ctx);

    let other_log = Log::default();
    let mut other = node_with(Recorder::new(&other_log, Arity::Fixed(1)), 1, &mut ctx);

    node.on_enter(&mut ctx);
    let dispatch = node.on_return_value(&mut ctx, &Value::Int(1));
    assert_eq!(dispatch, Dispatch::Replace(Value::Int(99)));
    assert_eq!(ctx.relay().peek(), Some(&Value::Int(99)));

    // The unwind arrives, possibly at a different node.
    assert_eq!(other.on_unwind(&mut ctx, Value::Int(99)), Value::Int(99));
    assert!(!ctx.relay().is_pending());

    // An unrelated later input sees its own value.
    other.on_enter(&mut ctx);
    other.on_input_value(&mut ctx, 0, Value::Int(7));
    assert!(calls(&other_log).contains(&Call::Input(0, Value::Int(7))));
}

#[test]
fn unwind_resets_reentrancy() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(0)), 0, &mut ctx);

    node.on_enter(&mut ctx);
    node.on_enter(&mut ctx);
    assert_eq!(node.pending_activations(), 2);
    node.on_unwind(&mut ctx, Value::Null);
    assert_eq!(node.pending_activations(), 0);

    // Returns without an open activation do not dispatch.
    assert_eq!(node.on_return_value(&mut ctx, &Value::Null), Dispatch::Continue);
    assert_eq!(ctx.counters().get(OperationKind::Binary).post_hits, 0);
}

#[test]
fn nested_activations_keep_separate_buffers() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(1)), 1, &mut ctx);

    node.on_enter(&mut ctx);
    node.on_input_value(&mut ctx, 0, Value::Int(1));
    node.on_enter(&mut ctx);
    node.on_input_value(&mut ctx, 0, Value::Int(2));
    node.on_return_value(&mut ctx, &Value::str("inner"));
    node.on_return_value(&mut ctx, &Value::str("outer"));

    let posts: Vec<_> = calls(&log)
        .into_iter()
        .filter(|c| matches!(c, Call::Post(..)))
        .collect();
    assert_eq!(
        posts,
        vec![
            Call::Post(Value::str("inner"), vec![Value::Int(2)]),
            Call::Post(Value::str("outer"), vec![Value::Int(1)]),
        ]
    );
}

#[test]
fn exceptional_receives_only_populated_prefix() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(3)), 3, &mut ctx);

    node.on_enter(&mut ctx);
    node.on_input_value(&mut ctx, 0, Value::Int(0));
    node.on_input_value(&mut ctx, 1, Value::Int(1));
    let fault = Fault::Program(ProgramFault::new("operand 2 threw"));
    let dispatch = node.on_return_exceptional(&mut ctx, &fault);

    assert_eq!(dispatch, Dispatch::Continue);
    assert_eq!(
        calls(&log).last(),
        Some(&Call::Exceptional(
            "operand 2 threw".into(),
            vec![Value::Int(0), Value::Int(1)]
        ))
    );
    assert_eq!(ctx.counters().get(OperationKind::Binary).exception_hits, 1);
}

#[test]
fn exceptional_replacement_is_published() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.exceptional_replacement = Some(Value::str("recovered"));
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    let dispatch =
        node.on_return_exceptional(&mut ctx, &Fault::Program(ProgramFault::new("boom")));
    assert_eq!(dispatch, Dispatch::Replace(Value::str("recovered")));
    assert_eq!(ctx.relay().peek(), Some(&Value::str("recovered")));
}

#[test]
fn control_transfers_go_to_ctrl_flow_phase_without_replacement() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(1));
    recorder.exceptional_replacement = Some(Value::Int(1));
    let mut node = node_with(recorder, 1, &mut ctx);

    node.on_enter(&mut ctx);
    let dispatch =
        node.on_return_exceptional(&mut ctx, &Fault::Control(ControlTransfer::Break));
    assert_eq!(dispatch, Dispatch::Continue);
    assert_eq!(calls(&log).last(), Some(&Call::CtrlFlow(vec![])));
    assert!(!ctx.relay().is_pending());
}

#[test]
fn deactivation_is_terminal_and_counted_once() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.plan = Plan::DeactivateAfterPost;
    recorder.post_replacement = Some(Value::Int(8));
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    // The deactivating dispatch still delivers its replacement.
    assert_eq!(
        node.on_return_value(&mut ctx, &Value::Int(1)),
        Dispatch::Replace(Value::Int(8))
    );
    assert!(node.is_deactivated());
    assert_eq!(node.on_unwind(&mut ctx, Value::Int(8)), Value::Int(8));
    let seen = calls(&log).len();

    for _ in 0..3 {
        node.on_enter(&mut ctx);
        node.on_input_value(&mut ctx, 0, Value::Int(1));
        node.on_return_value(&mut ctx, &Value::Int(2));
        node.on_return_exceptional(&mut ctx, &Fault::Program(ProgramFault::new("x")));
    }

    assert_eq!(calls(&log).len(), seen);
    let counters = ctx.counters().get(OperationKind::Binary);
    assert_eq!(counters.deactivated_count, 1);
    assert_eq!((counters.pre_hits, counters.post_hits), (1, 1));
}

#[test]
fn handler_specializes_after_pre() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.plan = Plan::SpecializeAfterPre;
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    // The replacement handler observes the post phase.
    assert_eq!(
        node.on_return_value(&mut ctx, &Value::Null),
        Dispatch::Replace(Value::str("specialized"))
    );
    assert!(!node.is_deactivated());
}

#[test]
fn swallowed_analysis_fault_means_no_replacement() {
    let mut ctx = context();
    ctx.reporter_mut().set_ignore_analysis_faults(true);
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.post_replacement = Some(Value::Int(1));
    recorder.fail_post = Some(AnalysisError::failed("bug in analysis"));
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    assert_eq!(node.on_return_value(&mut ctx, &Value::Null), Dispatch::Continue);
    assert_eq!(ctx.reporter().reported_count(), 1);
    assert!(!ctx.relay().is_pending());
}

#[test]
fn raised_guest_exception_is_not_fatal() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.fail_post = Some(AnalysisError::Raised(ProgramFault::new("TypeError")));
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    assert_eq!(node.on_return_value(&mut ctx, &Value::Null), Dispatch::Continue);
    assert_eq!(ctx.reporter().reported_count(), 1);
}

#[test]
#[should_panic(expected = "terminated with 255")]
fn analysis_fault_is_fatal_by_default() {
    let mut ctx = context();
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.fail_post = Some(AnalysisError::failed("bug in analysis"));
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    node.on_return_value(&mut ctx, &Value::Null);
}

#[test]
fn handler_panic_becomes_analysis_fault() {
    let mut ctx = context();
    ctx.reporter_mut().set_ignore_analysis_faults(true);
    let log = Log::default();
    let mut recorder = Recorder::new(&log, Arity::Fixed(0));
    recorder.panic_pre = true;
    let mut node = node_with(recorder, 0, &mut ctx);

    node.on_enter(&mut ctx);
    assert_eq!(ctx.reporter().reported_count(), 1);
    // The activation survives and the post phase still runs.
    node.on_return_value(&mut ctx, &Value::Null);
    assert_eq!(calls(&log).last(), Some(&Call::Post(Value::Null, vec![])));
}

#[test]
fn enabling_mid_activation_is_not_retroactive() {
    let mut ctx = context();
    let log = Log::default();
    let mut node = node_with(Recorder::new(&log, Arity::Fixed(1)), 1, &mut ctx);

    ctx.set_enabled(false);
    node.on_enter(&mut ctx);
    ctx.set_enabled(true);
    node.on_input_value(&mut ctx, 0, Value::Int(1));
    node.on_return_value(&mut ctx, &Value::Int(2));

    assert!(calls(&log).is_empty());
}

#[test]
fn unwind_clears_relay_while_disabled() {
    let mut ctx = context();
    let log = Log::default();
    let mut producer = node_with(Recorder::new(&log, Arity::Fixed(0)), 0, &mut ctx);
    let consumer_log = Log::default();
    let mut consumer = node_with(Recorder::new(&consumer_log, Arity::Fixed(1)), 1, &mut ctx);

    ctx.relay_mut().publish(Value::Int(99));
    ctx.set_enabled(false);
    assert_eq!(producer.on_unwind(&mut ctx, Value::Int(99)), Value::Int(99));
    assert!(!ctx.relay().is_pending());

    ctx.set_enabled(true);
    consumer.on_enter(&mut ctx);
    consumer.on_input_value(&mut ctx, 0, Value::Int(7));
    assert!(calls(&consumer_log).contains(&Call::Input(0, Value::Int(7))));
    assert!(calls(&log).is_empty());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CallIn {
    Enter,
    Input(usize, i64),
    Return(i64),
    Exceptional,
    Unwind,
}

fn call_in() -> impl Strategy<Value = CallIn> {
    prop_oneof![
        Just(CallIn::Enter),
        (0usize..4, any::<i64>()).prop_map(|(i, v)| CallIn::Input(i, v)),
        any::<i64>().prop_map(CallIn::Return),
        Just(CallIn::Exceptional),
        Just(CallIn::Unwind),
    ]
}

proptest! {
    #[test]
    fn pre_and_post_see_all_inputs_in_order(
        values in proptest::collection::vec(any::<i64>(), 1..8),
        substitute in proptest::collection::vec(any::<bool>(), 8),
    ) {
        let mut ctx = context();
        let log = Log::default();
        let n = values.len();
        let mut recorder = Recorder::new(&log, Arity::Fixed(n));
        let mut expected = Vec::new();
        for (i, v) in values.iter().enumerate() {
            if substitute[i] {
                let replaced = Value::Int(v.wrapping_add(1));
                recorder.input_replacements.insert(i, replaced.clone());
                expected.push(replaced);
            } else {
                expected.push(Value::Int(*v));
            }
        }
        let mut node = node_with(recorder, n, &mut ctx);

        node.on_enter(&mut ctx);
        for (i, v) in values.iter().enumerate() {
            if let Dispatch::Replace(carried) = node.on_input_value(&mut ctx, i, Value::Int(*v)) {
                // Host resolves the operand abort at the operand; the
                // relay must not leak into the next operand.
                ctx.relay_mut().clear();
                prop_assert_eq!(&carried, &expected[i]);
            }
        }
        node.on_return_value(&mut ctx, &Value::Null);

        let log = calls(&log);
        prop_assert!(log.contains(&Call::Pre(expected.clone())));
        prop_assert_eq!(log.last(), Some(&Call::Post(Value::Null, expected)));
    }

    #[test]
    fn disabled_gate_makes_every_call_in_a_no_op(
        sequence in proptest::collection::vec(call_in(), 0..32),
    ) {
        let mut ctx = context();
        let log = Log::default();
        let mut recorder = Recorder::new(&log, Arity::Fixed(2));
        recorder.post_replacement = Some(Value::Int(1));
        let mut node = node_with(recorder, 2, &mut ctx);
        let before = ctx.counters().get(OperationKind::Binary);
        ctx.set_enabled(false);

        for call in sequence {
            match call {
                CallIn::Enter => node.on_enter(&mut ctx),
                CallIn::Input(i, v) => {
                    prop_assert_eq!(node.on_input_value(&mut ctx, i, Value::Int(v)), Dispatch::Continue);
                }
                CallIn::Return(v) => {
                    prop_assert_eq!(node.on_return_value(&mut ctx, &Value::Int(v)), Dispatch::Continue);
                }
                CallIn::Exceptional => {
                    let fault = Fault::Program(ProgramFault::new("x"));
                    prop_assert_eq!(node.on_return_exceptional(&mut ctx, &fault), Dispatch::Continue);
                }
                CallIn::Unwind => {
                    prop_assert_eq!(node.on_unwind(&mut ctx, Value::Int(3)), Value::Int(3));
                }
            }
        }

        prop_assert!(calls(&log).is_empty());
        prop_assert_eq!(ctx.counters().get(OperationKind::Binary), before);
        prop_assert!(!ctx.relay().is_pending());
    }

    #[test]
    fn reentrancy_counter_never_underflows(
        sequence in proptest::collection::vec(call_in(), 0..32),
    ) {
        let mut ctx = context();
        let log = Log::default();
        let mut node = node_with(Recorder::new(&log, Arity::Fixed(2)), 2, &mut ctx);
        let mut model: usize = 0;

        for call in sequence {
            match call {
                CallIn::Enter => {
                    node.on_enter(&mut ctx);
                    model += 1;
                }
                CallIn::Input(i, v) => {
                    node.on_input_value(&mut ctx, i, Value::Int(v));
                }
                CallIn::Return(v) => {
                    node.on_return_value(&mut ctx, &Value::Int(v));
                    model = model.saturating_sub(1);
                }
                CallIn::Exceptional => {
                    node.on_return_exceptional(&mut ctx, &Fault::Program(ProgramFault::new("x")));
                    model = model.saturating_sub(1);
                }
                CallIn::Unwind => {
                    node.on_unwind(&mut ctx, Value::Null);
                    model = 0;
                }
            }
            prop_assert_eq!(node.pending_activations(), model);
        }
    }
}
