//! Event interception protocol for instrumented program locations.
//!
//! The host runtime calls into one [`EventNode`] per instrumented location at
//! five points: enter, each operand, normal return, exceptional return and
//! unwind. The node drives a pluggable [`Handler`] through its phases,
//! applies value substitutions, and keeps faults in analysis code from
//! leaking into the host's control flow.
//!
//! # Modules
//!
//! - [`node`]: the per-location dispatch state machine
//! - [`handler`]: the handler contract and factory extension point
//! - [`relay`]: single-slot channel for a pending substitution
//! - [`reporter`]: fault reporting and the fatal-exit policy
//! - [`controller`]: process-wide enable/disable gate
//! - [`counters`]: per-kind telemetry
//! - [`context`]: the explicit context threaded through every call-in
//! - [`config`]: global switches

pub mod config;
pub mod context;
pub mod controller;
pub mod counters;
pub mod handler;
pub mod node;
pub mod relay;
pub mod reporter;

pub use config::DispatchConfig;
pub use context::DispatchContext;
pub use controller::InstrumentationController;
pub use counters::{AggregateCounters, KindCounters, KindTelemetry, TelemetryReport};
pub use handler::{Arity, Handler, HandlerFactory, HandlerRegistry, HandlerResult, HandlerUpdate};
pub use node::{Dispatch, EventNode, InputBuffer};
pub use relay::ValueRelay;
pub use reporter::{ErrorReporter, Reported, TerminateFn, FATAL_EXIT_CODE};
