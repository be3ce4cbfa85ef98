//! Runtime value representation seen by analyses.
//!
//! [`Value`] is what flows through every event: operands, results, thrown
//! payloads and substitutions. It models a dynamically typed guest language
//! closely enough for analyses to inspect receivers, callees and properties.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A callable value. The host resolves calls by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRef {
    pub name: String,
    #[serde(default)]
    pub is_async: bool,
}

impl FunctionRef {
    /// A synchronous function.
    pub fn new(name: impl Into<String>) -> Self {
        FunctionRef {
            name: name.into(),
            is_async: false,
        }
    }
}

/// A runtime value produced or consumed by the monitored program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// Own properties in insertion order.
    Object(IndexMap<String, Value>),
    Function(FunctionRef),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Builds an object from `(key, value)` pairs, preserving order.
    pub fn object<K, I>(fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns a human-readable name of the value's runtime type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Truthiness as used by conditionals and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Looks up an own property of an object value.
    pub fn get_own(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(key),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "function {}", func.name),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_dynamic_language_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn display_nested_values() {
        let v = Value::object([
            ("a", Value::Int(1)),
            ("b", Value::Array(vec![Value::Bool(true), Value::Null])),
        ]);
        assert_eq!(v.to_string(), "{a: 1, b: [true, null]}");
        assert_eq!(
            Value::Function(FunctionRef::new("f")).to_string(),
            "function f"
        );
    }

    #[test]
    fn object_preserves_insertion_order() {
        let v = Value::object([("z", Value::Int(1)), ("a", Value::Int(2))]);
        match v {
            Value::Object(fields) => {
                let keys: Vec<_> = fields.keys().cloned().collect();
                assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn function_ref_defaults_deserialize() {
        let f: FunctionRef = serde_json::from_str(r#"{"name":"g"}"#).unwrap();
        assert_eq!(f, FunctionRef::new("g"));
    }
}
