//! Reference host for the event interception layer.
//!
//! Evaluates programs of a small dynamically typed expression language and
//! reports every instrumentable construct to an [`EventNode`] built by the
//! registered handler factories.
//!
//! [`EventNode`]: evtap_dispatch::EventNode

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod trace;

pub use ast::{BinaryOp, Expr, ExprKind, Program};
pub use config::HostConfig;
pub use error::HostError;
pub use interpreter::Interpreter;
pub use trace::TraceEntry;
