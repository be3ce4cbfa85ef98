//! Instrumented program locations and their operation kinds.
//!
//! An [`ExecutionLocation`] is built by the host when it attaches
//! instrumentation to a construct and never changes afterwards. The
//! [`OperationKind`] tag selects the handler factory and the counter bucket.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::LocationId;
use crate::value::Value;

/// Classification tag of an instrumented construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Literal,
    Binary,
    Invoke,
    New,
    Eval,
    GetField,
    GetElement,
    Loop,
    Conditional,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Literal,
        OperationKind::Binary,
        OperationKind::Invoke,
        OperationKind::New,
        OperationKind::Eval,
        OperationKind::GetField,
        OperationKind::GetElement,
        OperationKind::Loop,
        OperationKind::Conditional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Literal => "literal",
            OperationKind::Binary => "binary",
            OperationKind::Invoke => "invoke",
            OperationKind::New => "new",
            OperationKind::Eval => "eval",
            OperationKind::GetField => "getField",
            OperationKind::GetElement => "getElement",
            OperationKind::Loop => "loop",
            OperationKind::Conditional => "conditional",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source position of an instrumented construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        SourceSpan {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Identity and static facts of one instrumented program point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLocation {
    pub id: LocationId,
    pub kind: OperationKind,
    pub span: SourceSpan,
    /// Number of operands the host will report for this construct.
    pub input_count: usize,
    /// Construct-specific facts (`operator`, `property`, `isInvoke`, ...).
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
}

impl ExecutionLocation {
    pub fn new(id: LocationId, kind: OperationKind, span: SourceSpan, input_count: usize) -> Self {
        ExecutionLocation {
            id,
            kind,
            span,
            input_count,
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter used by hosts at attach time.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(Value::as_str)
    }

    /// Boolean attribute, `false` when absent or not a boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.attribute(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl fmt::Display for ExecutionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} (iid {})", self.kind, self.span, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_queryable() {
        let loc = ExecutionLocation::new(
            LocationId(3),
            OperationKind::Binary,
            SourceSpan::new("main.js", 4, 9),
            2,
        )
        .with_attribute("operator", Value::str("+"))
        .with_attribute("isInvoke", Value::Bool(true));

        assert_eq!(loc.attribute_str("operator"), Some("+"));
        assert!(loc.flag("isInvoke"));
        assert!(!loc.flag("isNew"));
        assert_eq!(loc.to_string(), "binary@main.js:4:9 (iid 3)");
    }

    #[test]
    fn kind_names_are_unique() {
        let mut names: Vec<_> = OperationKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), OperationKind::ALL.len());
    }
}
