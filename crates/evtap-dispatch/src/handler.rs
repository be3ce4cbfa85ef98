//! The handler capability contract and the factory extension point.
//!
//! A [`Handler`] is the per-location analysis logic an [`EventNode`] drives.
//! Every phase has a no-op default so implementations only override the
//! phases they observe. Handlers are never shared between locations and are
//! only ever called by their owning node, one phase at a time.
//!
//! [`EventNode`]: crate::EventNode

use std::collections::BTreeMap;

use evtap_core::{AnalysisError, ControlTransfer, ExecutionLocation, OperationKind, ProgramFault, Value};

/// Result of a phase that may substitute a value.
pub type HandlerResult = Result<Option<Value>, AnalysisError>;

/// Number of operands a handler wants saved and dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// As many operands as the host reports for the location.
    Variable,
}

impl Arity {
    /// Whether the operand at `index` is dispatched and saved.
    pub fn accepts(self, index: usize) -> bool {
        match self {
            Arity::Fixed(n) => index < n,
            Arity::Variable => true,
        }
    }
}

/// Answer to the replacement check run after every pre/post firing.
pub enum HandlerUpdate {
    Keep,
    /// Swap in a different handler for all later events at this location.
    Replace(Box<dyn Handler>),
    /// Stop instrumenting this location for the rest of the run.
    Deactivate,
}

impl std::fmt::Debug for HandlerUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerUpdate::Keep => write!(f, "Keep"),
            HandlerUpdate::Replace(h) => write!(f, "Replace({})", h.name()),
            HandlerUpdate::Deactivate => write!(f, "Deactivate"),
        }
    }
}

/// Per-location analysis logic.
pub trait Handler {
    /// Diagnostic name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn expected_inputs(&self) -> Arity;

    /// Whether `index` is the last operand, firing the pre phase.
    ///
    /// `index` is `None` when asked on enter, before any operand. For
    /// `Fixed(n)` the last index is `n - 1` (or enter itself when `n == 0`);
    /// for `Variable` it is `input_count - 1`, the host-declared count.
    fn is_last_index(&self, input_count: usize, index: Option<usize>) -> bool {
        let position = index.map_or(0, |i| i + 1);
        match self.expected_inputs() {
            Arity::Fixed(n) => position == n,
            Arity::Variable => position == input_count,
        }
    }

    fn enter(&mut self) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn execute_on_input(&mut self, _index: usize, _input: &Value) -> HandlerResult {
        Ok(None)
    }

    fn execute_pre(&mut self, _inputs: &[Value]) -> HandlerResult {
        Ok(None)
    }

    fn execute_post(&mut self, _result: &Value, _inputs: &[Value]) -> HandlerResult {
        Ok(None)
    }

    fn execute_exceptional(&mut self, _fault: &ProgramFault, _inputs: &[Value]) -> HandlerResult {
        Ok(None)
    }

    /// Internal flow-only aborts. Never substitutes a value.
    fn execute_exceptional_ctrl_flow(
        &mut self,
        _transfer: &ControlTransfer,
        _inputs: &[Value],
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn wants_to_update_handler(&mut self) -> HandlerUpdate {
        HandlerUpdate::Keep
    }
}

/// Builds one handler per attached location.
///
/// Consulted once at attachment time, never on the dispatch path.
pub trait HandlerFactory {
    fn kind(&self) -> OperationKind;

    fn create(&self, location: &ExecutionLocation) -> Box<dyn Handler>;
}

/// Factories keyed by the operation kind they serve.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<OperationKind, Box<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    /// Registers `factory` for its kind, replacing any previous one.
    pub fn register(&mut self, factory: Box<dyn HandlerFactory>) -> &mut Self {
        self.factories.insert(factory.kind(), factory);
        self
    }

    pub fn get(&self, kind: OperationKind) -> Option<&dyn HandlerFactory> {
        self.factories.get(&kind).map(|f| f.as_ref())
    }

    pub fn kinds(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.factories.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
