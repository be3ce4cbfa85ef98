//! Tree-walking interpreter that drives event nodes.
//!
//! The interpreter owns one [`EventNode`] per instrumented construct and
//! calls into it as evaluation proceeds:
//!
//! - `on_enter` before a construct evaluates anything.
//! - `on_input_value` as each operand finishes, carrying the operand's raw
//!   value. This happens before a substitution the operand's own handler
//!   requested is resolved, which is why the relay exists.
//! - `on_return_value` / `on_return_exceptional` when the construct completes.
//! - `on_unwind` on the node whose evaluation a substitution aborts. An
//!   uninstrumented abort point clears the relay instead.
//!
//! A substitution requested at an operand replaces only that operand; the
//! enclosing construct keeps evaluating with the new value. A substitution
//! requested at a construct's return becomes the construct's result.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use evtap_core::{
    ControlTransfer, CoreError, ExecutionLocation, Fault, FunctionRef, LocationId, OperationKind,
    ProgramFault, SourceSpan, Value,
};
use evtap_dispatch::{Dispatch, DispatchContext, EventNode, HandlerRegistry, TelemetryReport};

use crate::ast::{Expr, ExprKind, Program};
use crate::builtins::{self, BUILTINS};
use crate::config::HostConfig;
use crate::error::HostError;
use crate::trace::TraceEntry;

/// Why evaluation of a node stopped early.
enum Interrupt {
    Fault(Fault),
    Fatal(HostError),
}

impl From<ProgramFault> for Interrupt {
    fn from(fault: ProgramFault) -> Self {
        Interrupt::Fault(Fault::Program(fault))
    }
}

impl From<ControlTransfer> for Interrupt {
    fn from(transfer: ControlTransfer) -> Self {
        Interrupt::Fault(Fault::Control(transfer))
    }
}

impl From<HostError> for Interrupt {
    fn from(error: HostError) -> Self {
        Interrupt::Fatal(error)
    }
}

type Eval<T = Value> = Result<T, Interrupt>;

/// How a node finished: its raw value plus the substitution its handler
/// asked for, not yet resolved.
struct Exit {
    value: Value,
    substitute: Option<Value>,
}

fn named_fault(name: &str, message: String) -> ProgramFault {
    ProgramFault {
        payload: Value::object([
            ("name", Value::str(name)),
            ("message", Value::Str(message.clone())),
        ]),
        message,
    }
}

fn location_for(file: &str, expr: &Expr, kind: OperationKind) -> ExecutionLocation {
    let location = ExecutionLocation::new(
        expr.id,
        kind,
        SourceSpan::new(file, expr.line, expr.column),
        expr.input_count(),
    );
    match &expr.kind {
        ExprKind::Binary { op, .. } => location.with_attribute("operator", Value::str(op.as_str())),
        ExprKind::GetField { property, .. } => {
            location.with_attribute("property", Value::str(property))
        }
        ExprKind::Call { receiver, .. } => {
            location.with_attribute("isInvoke", Value::Bool(receiver.is_some()))
        }
        ExprKind::While { .. } => location.with_attribute("loopType", Value::str("while")),
        ExprKind::If { expression, .. } => {
            location.with_attribute("isConditional", Value::Bool(*expression))
        }
        _ => location,
    }
}

/// The reference host.
pub struct Interpreter {
    config: HostConfig,
    ctx: DispatchContext,
    registry: HandlerRegistry,
    nodes: BTreeMap<LocationId, EventNode>,
    env: HashMap<String, Value>,
    /// First id free for code created at run time (`eval`).
    next_id: u32,
    eval_depth: usize,
    /// Instrumented `eval` code by source text. Evaluating the same text
    /// again reuses its ids and nodes.
    eval_cache: HashMap<String, Rc<Program>>,
    trace: Option<Vec<TraceEntry>>,
}

impl Interpreter {
    pub fn new(config: HostConfig, registry: HandlerRegistry, ctx: DispatchContext) -> Self {
        let mut env: HashMap<String, Value> = BUILTINS
            .iter()
            .map(|name| (name.to_string(), Value::Function(FunctionRef::new(*name))))
            .collect();
        env.insert("global".to_string(), builtins::global_object());

        Interpreter {
            trace: config.trace_enabled.then(Vec::new),
            config,
            ctx,
            registry,
            nodes: BTreeMap::new(),
            env,
            next_id: 0,
            eval_depth: 0,
            eval_cache: HashMap::new(),
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut DispatchContext {
        &mut self.ctx
    }

    pub fn telemetry(&self) -> TelemetryReport {
        self.ctx.telemetry()
    }

    /// Recorded evaluations, empty unless tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or(&[])
    }

    /// Number of currently attached nodes.
    pub fn attached(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: LocationId) -> Option<&EventNode> {
        self.nodes.get(&id)
    }

    /// Attaches a node to every construct whose kind has a registered factory.
    pub fn instrument(&mut self, program: &Program) -> Result<usize, HostError> {
        self.next_id = self.next_id.max(program.end_id());
        let mut attached = 0;
        for expr in program.preorder() {
            if self.attach(&program.file, expr)? {
                attached += 1;
            }
        }
        tracing::debug!(file = %program.file, attached, "instrumented program");
        Ok(attached)
    }

    fn attach(&mut self, file: &str, expr: &Expr) -> Result<bool, CoreError> {
        let Some(kind) = expr.operation_kind() else {
            return Ok(false);
        };
        let Some(factory) = self.registry.get(kind) else {
            return Ok(false);
        };
        if self.nodes.contains_key(&expr.id) {
            return Err(CoreError::DuplicateLocation { id: expr.id });
        }
        let node = EventNode::from_factory(location_for(file, expr, kind), factory, &mut self.ctx);
        self.nodes.insert(expr.id, node);
        Ok(true)
    }

    /// Runs `program` to completion.
    pub fn run(&mut self, program: &Program) -> Result<Value, HostError> {
        self.next_id = self.next_id.max(program.end_id());
        tracing::debug!(file = %program.file, "running program");
        match self.eval(&program.root) {
            Ok(value) => Ok(value),
            Err(Interrupt::Fault(Fault::Program(fault))) => Err(HostError::Uncaught(fault)),
            Err(Interrupt::Fault(Fault::Control(transfer))) => {
                Err(HostError::StrayControl(transfer))
            }
            Err(Interrupt::Fatal(error)) => Err(error),
        }
    }

    // -----------------------------------------------------------------------
    // Event plumbing
    // -----------------------------------------------------------------------

    /// Evaluates `expr` outside operand position. A substitution is
    /// resolved at the node itself.
    fn eval(&mut self, expr: &Expr) -> Eval {
        let exit = self.exit(expr)?;
        Ok(match exit.substitute {
            Some(value) => self.unwind_at(Some(expr.id), value),
            None => exit.value,
        })
    }

    /// Evaluates operand `index` of `parent` and delivers its input event.
    fn operand(&mut self, parent: LocationId, index: usize, child: &Expr) -> Eval {
        let exit = self.exit(child)?;
        Ok(self.settle(parent, index, exit, Some(child.id)))
    }

    /// An operand with no expression behind it, such as a missing receiver.
    fn implicit_operand(&mut self, parent: LocationId, index: usize, value: Value) -> Value {
        let exit = Exit {
            value,
            substitute: None,
        };
        self.settle(parent, index, exit, None)
    }

    fn settle(
        &mut self,
        parent: LocationId,
        index: usize,
        exit: Exit,
        child: Option<LocationId>,
    ) -> Value {
        let dispatched = match self.nodes.get_mut(&parent) {
            Some(node) => node.on_input_value(&mut self.ctx, index, exit.value.clone()),
            None => Dispatch::Continue,
        };
        match dispatched.replacement().or(exit.substitute) {
            Some(value) => self.unwind_at(child, value),
            None => exit.value,
        }
    }

    fn unwind_at(&mut self, id: Option<LocationId>, value: Value) -> Value {
        match id.and_then(|id| self.nodes.get_mut(&id)) {
            Some(node) => node.on_unwind(&mut self.ctx, value),
            None => {
                self.ctx.relay_mut().clear();
                value
            }
        }
    }

    fn exit(&mut self, expr: &Expr) -> Eval<Exit> {
        let id = expr.id;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.on_enter(&mut self.ctx);
        }

        let exit = match self.eval_kind(expr) {
            Ok(value) => {
                let substitute = match self.nodes.get_mut(&id) {
                    Some(node) => node.on_return_value(&mut self.ctx, &value).replacement(),
                    None => None,
                };
                Ok(Exit { value, substitute })
            }
            Err(Interrupt::Fault(fault)) => {
                let substitute = match self.nodes.get_mut(&id) {
                    Some(node) => node.on_return_exceptional(&mut self.ctx, &fault).replacement(),
                    None => None,
                };
                match substitute {
                    Some(value) => Ok(Exit {
                        value: Value::Undefined,
                        substitute: Some(value),
                    }),
                    None => Err(Interrupt::Fault(fault)),
                }
            }
            Err(fatal) => Err(fatal),
        };

        if let Some(trace) = &mut self.trace {
            let output = exit
                .as_ref()
                .ok()
                .map(|e| e.substitute.clone().unwrap_or_else(|| e.value.clone()));
            trace.push(TraceEntry {
                id,
                construct: expr.construct_name(),
                output,
            });
        }

        if self.nodes.get(&id).is_some_and(EventNode::is_deactivated) {
            tracing::debug!(iid = %id, "detaching deactivated node");
            self.nodes.remove(&id);
        }
        exit
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    fn eval_kind(&mut self, expr: &Expr) -> Eval {
        let id = expr.id;
        match &expr.kind {
            ExprKind::Lit { value } => Ok(value.clone()),

            ExprKind::Var { name } => self.env.get(name).cloned().ok_or_else(|| {
                named_fault("ReferenceError", format!("{} is not defined", name)).into()
            }),

            ExprKind::Let { name, value } => {
                let value = self.eval(value)?;
                self.env.insert(name.clone(), value.clone());
                Ok(value)
            }

            ExprKind::Assign { name, value } => {
                let value = self.eval(value)?;
                match self.env.get_mut(name) {
                    Some(slot) => {
                        *slot = value.clone();
                        Ok(value)
                    }
                    None => Err(named_fault(
                        "ReferenceError",
                        format!("assignment to undeclared {}", name),
                    )
                    .into()),
                }
            }

            ExprKind::Seq { body } => {
                let mut last = Value::Undefined;
                for stmt in body {
                    last = self.eval(stmt)?;
                }
                Ok(last)
            }

            ExprKind::Binary { op, left, right } => {
                let left = self.operand(id, 0, left)?;
                if op.short_circuits() {
                    if builtins::short_circuit(*op, &left) {
                        return Ok(left);
                    }
                    return self.operand(id, 1, right);
                }
                let right = self.operand(id, 1, right)?;
                Ok(builtins::apply_binary(*op, &left, &right)?)
            }

            ExprKind::Call {
                receiver,
                callee,
                args,
            } => {
                // Builtins ignore the receiver; it is still reported.
                match receiver {
                    Some(receiver) => {
                        self.operand(id, 0, receiver)?;
                    }
                    None => {
                        self.implicit_operand(id, 0, Value::Undefined);
                    }
                }
                let function = self.operand(id, 1, callee)?;
                let mut values = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    values.push(self.operand(id, 2 + i, arg)?);
                }
                Ok(builtins::call_builtin(&function, &values, false)?)
            }

            ExprKind::New { callee, args } => {
                let function = self.operand(id, 0, callee)?;
                let mut values = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    values.push(self.operand(id, 1 + i, arg)?);
                }
                Ok(builtins::call_builtin(&function, &values, true)?)
            }

            ExprKind::GetField { object, property } => {
                let receiver = self.operand(id, 0, object)?;
                if builtins::is_global(&receiver) {
                    return Ok(self.env.get(property).cloned().unwrap_or(Value::Undefined));
                }
                Ok(builtins::get_field(&receiver, property)?)
            }

            ExprKind::GetElement { object, key } => {
                let receiver = self.operand(id, 0, object)?;
                let key = self.operand(id, 1, key)?;
                Ok(builtins::get_element(&receiver, &key)?)
            }

            ExprKind::Eval { code } => {
                let code = self.operand(id, 0, code)?;
                self.eval_code(id, code)
            }

            ExprKind::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                if self.operand(id, 0, cond)?.is_truthy() {
                    self.eval(then)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise)
                } else {
                    Ok(Value::Undefined)
                }
            }

            ExprKind::While { cond, body } => {
                let limit = self.config.max_loop_iterations;
                let mut iterations = 0;
                while self.eval(cond)?.is_truthy() {
                    iterations += 1;
                    if iterations > limit {
                        return Err(HostError::LoopLimitExceeded { id, limit }.into());
                    }
                    match self.eval(body) {
                        Ok(_) | Err(Interrupt::Fault(Fault::Control(ControlTransfer::Continue))) => {}
                        Err(Interrupt::Fault(Fault::Control(ControlTransfer::Break))) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Undefined)
            }

            ExprKind::Break => Err(ControlTransfer::Break.into()),
            ExprKind::Continue => Err(ControlTransfer::Continue.into()),

            ExprKind::Throw { value } => {
                let value = self.eval(value)?;
                Err(ProgramFault::thrown(value).into())
            }

            ExprKind::Try {
                body,
                name,
                handler,
            } => match self.eval(body) {
                Err(Interrupt::Fault(Fault::Program(fault))) => {
                    self.env.insert(name.clone(), fault.payload);
                    self.eval(handler)
                }
                other => other,
            },
        }
    }

    /// Parses, instruments and evaluates code produced at run time.
    /// Non-string code evaluates to itself.
    fn eval_code(&mut self, id: LocationId, code: Value) -> Eval {
        let Value::Str(source) = code else {
            return Ok(code);
        };
        let limit = self.config.max_call_depth;
        if self.eval_depth >= limit {
            return Err(HostError::CallDepthExceeded { id, limit }.into());
        }
        let program = match self.eval_cache.get(&source) {
            Some(program) => Rc::clone(program),
            None => {
                let root: Expr = serde_json::from_str(&source)
                    .map_err(|e| named_fault("SyntaxError", e.to_string()))?;
                let program = Rc::new(Program::numbered_from("<eval>", root, self.next_id));
                self.next_id = program.end_id();
                for expr in program.preorder() {
                    self.attach(&program.file, expr)
                        .map_err(|e| Interrupt::Fatal(e.into()))?;
                }
                self.eval_cache.insert(source, Rc::clone(&program));
                program
            }
        };

        self.eval_depth += 1;
        let result = self.eval(&program.root);
        self.eval_depth -= 1;
        result
    }
}
