//! Handler factories that bind analysis callbacks to operation kinds.
//!
//! Each factory builds one handler per instrumented location. Handlers turn
//! phase events into named-argument callbacks (see [`CallbackArgs`]); only
//! the results of post, input and exception callbacks substitute values.

pub mod binary;
pub mod callback;
pub mod control_flow;
pub mod eval;
pub mod get_element;
pub mod get_field;
pub mod invoke;
pub mod literal;
mod site;
pub mod taint;

use evtap_core::OperationKind;
use evtap_dispatch::{HandlerFactory, HandlerRegistry};

pub use binary::BinaryFactory;
pub use callback::{callback, Callback, CallbackArgs, Endpoints};
pub use control_flow::{ConditionalFactory, LoopFactory};
pub use eval::EvalFactory;
pub use get_element::GetElementFactory;
pub use get_field::GetFieldFactory;
pub use invoke::{InvokeFactory, SPECIALIZE_AFTER};
pub use literal::LiteralFactory;
pub use taint::{collect_taints, has_taint};

/// The factory serving `kind`, bound to `endpoints`.
pub fn factory_for(kind: OperationKind, endpoints: Endpoints) -> Box<dyn HandlerFactory> {
    match kind {
        OperationKind::Literal => Box::new(LiteralFactory::new(endpoints)),
        OperationKind::Binary => Box::new(BinaryFactory::new(endpoints)),
        OperationKind::Invoke => Box::new(InvokeFactory::invoke(endpoints)),
        OperationKind::New => Box::new(InvokeFactory::new_call(endpoints)),
        OperationKind::Eval => Box::new(EvalFactory::new(endpoints)),
        OperationKind::GetField => Box::new(GetFieldFactory::new(endpoints)),
        OperationKind::GetElement => Box::new(GetElementFactory::new(endpoints)),
        OperationKind::Loop => Box::new(LoopFactory::new(endpoints)),
        OperationKind::Conditional => Box::new(ConditionalFactory::new(endpoints)),
    }
}

/// A registry with every kind bound to the same endpoints.
pub fn registry_with(endpoints: &Endpoints) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for kind in OperationKind::ALL {
        registry.register(factory_for(kind, endpoints.clone()));
    }
    registry
}
