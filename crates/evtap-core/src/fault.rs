//! Fault taxonomy for abnormal completion of a construct.
//!
//! A construct can complete abnormally for two unrelated reasons: the
//! monitored program raised an exception ([`ProgramFault`]), or the runtime
//! transferred control non-locally for flow purposes ([`ControlTransfer`]).
//! Only the former may be replaced by an analysis; the latter is never an
//! error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An exception raised by the monitored program itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ProgramFault {
    pub message: String,
    /// The thrown value as the program sees it (the error object).
    pub payload: Value,
}

impl ProgramFault {
    /// A fault whose payload is an error object carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        ProgramFault {
            payload: Value::object([("message", Value::Str(message.clone()))]),
            message,
        }
    }

    /// A fault raised by throwing an arbitrary value.
    pub fn thrown(payload: Value) -> Self {
        ProgramFault {
            message: format!("uncaught {}", payload),
            payload,
        }
    }
}

/// Non-local control flow used purely for flow purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlTransfer {
    Break,
    Continue,
}

impl fmt::Display for ControlTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlTransfer::Break => write!(f, "break"),
            ControlTransfer::Continue => write!(f, "continue"),
        }
    }
}

/// Abnormal completion of a construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Program(ProgramFault),
    Control(ControlTransfer),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Program(p) => write!(f, "{}", p),
            Fault::Control(c) => write!(f, "control transfer: {}", c),
        }
    }
}

impl From<ProgramFault> for Fault {
    fn from(p: ProgramFault) -> Self {
        Fault::Program(p)
    }
}

impl From<ControlTransfer> for Fault {
    fn from(c: ControlTransfer) -> Self {
        Fault::Control(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_fault_payload_carries_message() {
        let fault = ProgramFault::new("boom");
        assert_eq!(fault.to_string(), "boom");
        assert_eq!(fault.payload.get_own("message"), Some(&Value::str("boom")));
    }

    #[test]
    fn thrown_value_message() {
        let fault = ProgramFault::thrown(Value::Int(3));
        assert_eq!(fault.message, "uncaught 3");
        assert_eq!(fault.payload, Value::Int(3));
    }

    #[test]
    fn control_transfers_render_as_flow() {
        let fault = Fault::from(ControlTransfer::Break);
        assert!(matches!(fault, Fault::Control(ControlTransfer::Break)));
        assert_eq!(fault.to_string(), "control transfer: break");
    }
}
