//! Operator semantics and the builtin function table.
//!
//! Everything here is pure: failures come back as [`ProgramFault`]s the
//! guest program may catch.

use evtap_core::{FunctionRef, ProgramFault, Value};

use crate::ast::BinaryOp;

/// Names bound as builtin functions in every fresh environment.
pub const BUILTINS: &[&str] = &[
    "len", "str", "max", "concat", "fail", "taint", "Error", "Array", "Object",
];

/// Own property marking the global object.
pub const GLOBAL_MARKER: &str = "__global";

pub fn global_object() -> Value {
    Value::object([(GLOBAL_MARKER, Value::Bool(true))])
}

pub fn is_global(value: &Value) -> bool {
    value.get_own(GLOBAL_MARKER).is_some()
}

fn type_error(message: impl Into<String>) -> ProgramFault {
    let message = message.into();
    ProgramFault {
        payload: Value::object([
            ("name", Value::str("TypeError")),
            ("message", Value::Str(message.clone())),
        ]),
        message,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ProgramFault> {
    if let (Value::Int(l), Value::Int(r)) = (left, right) {
        let checked = match op {
            BinaryOp::Add => l.checked_add(*r),
            BinaryOp::Sub => l.checked_sub(*r),
            BinaryOp::Mul => l.checked_mul(*r),
            BinaryOp::Div if l.checked_rem(*r) == Some(0) => l.checked_div(*r),
            BinaryOp::Rem => l.checked_rem(*r),
            _ => None,
        };
        if let Some(v) = checked {
            return Ok(Value::Int(v));
        }
    }
    let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return Err(type_error(format!(
            "cannot apply {} to {} and {}",
            op.as_str(),
            left.type_name(),
            right.type_name()
        )));
    };
    let v = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        _ => l % r,
    };
    Ok(Value::Float(v))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ProgramFault> {
    let ordering = match (left, right) {
        (Value::Str(l), Value::Str(r)) => l.partial_cmp(r),
        _ => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) if !matches!((left, right), (Value::Bool(_), Value::Bool(_))) => l == r,
        _ => left == right,
    }
}

/// Applies a non-short-circuiting operator to two evaluated operands.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ProgramFault> {
    match op {
        BinaryOp::Add if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", left, right)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        // Short-circuit operators reach here only with both operands evaluated.
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => Ok(right.clone()),
    }
}

/// Whether `left` alone decides a short-circuit operator.
pub fn short_circuit(op: BinaryOp, left: &Value) -> bool {
    match op {
        BinaryOp::And => !left.is_truthy(),
        BinaryOp::Or => left.is_truthy(),
        BinaryOp::Coalesce => !matches!(left, Value::Undefined | Value::Null),
        _ => false,
    }
}

/// Reads a named property.
pub fn get_field(receiver: &Value, property: &str) -> Result<Value, ProgramFault> {
    match receiver {
        Value::Undefined | Value::Null => Err(type_error(format!(
            "cannot read property {} of {}",
            property, receiver
        ))),
        Value::Str(s) if property == "length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(items) if property == "length" => Ok(Value::Int(items.len() as i64)),
        Value::Function(f) if property == "name" => Ok(Value::str(&f.name)),
        _ => Ok(receiver.get_own(property).cloned().unwrap_or(Value::Undefined)),
    }
}

/// Reads a computed property.
pub fn get_element(receiver: &Value, key: &Value) -> Result<Value, ProgramFault> {
    match (receiver, key) {
        (Value::Array(items), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Undefined)),
        (Value::Str(s), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Undefined)),
        (_, Value::Str(name)) => get_field(receiver, name),
        (_, other) => get_field(receiver, &other.to_string()),
    }
}

fn error_object(args: &[Value]) -> Value {
    let message = args.first().map(|m| m.to_string()).unwrap_or_default();
    Value::object([
        ("name", Value::str("Error")),
        ("message", Value::Str(message)),
    ])
}

/// Calls builtin `function` with `args`. `construct` is set for `new`.
pub fn call_builtin(
    function: &Value,
    args: &[Value],
    construct: bool,
) -> Result<Value, ProgramFault> {
    let Some(FunctionRef { name, .. }) = function.as_function() else {
        return Err(type_error(format!("{} is not a function", function)));
    };
    if construct {
        return match name.as_str() {
            "Error" => Ok(error_object(args)),
            "Array" => Ok(Value::Array(args.to_vec())),
            "Object" => Ok(Value::object(Vec::<(String, Value)>::new())),
            _ => Err(type_error(format!("{} is not a constructor", name))),
        };
    }
    match name.as_str() {
        "len" => match args.first() {
            Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::Array(items)) => Ok(Value::Int(items.len() as i64)),
            Some(Value::Object(fields)) => Ok(Value::Int(fields.len() as i64)),
            _ => Ok(Value::Int(0)),
        },
        "str" => Ok(Value::Str(
            args.first().map(|v| v.to_string()).unwrap_or_default(),
        )),
        "max" => args
            .iter()
            .try_fold(None::<f64>, |acc, v| {
                as_number(v)
                    .map(|n| Some(acc.map_or(n, |a: f64| a.max(n))))
                    .ok_or_else(|| type_error(format!("max: {} is not a number", v)))
            })
            .map(|m| match m {
                Some(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Value::Int(n as i64),
                Some(n) => Value::Float(n),
                None => Value::Undefined,
            }),
        "concat" => Ok(Value::Str(args.iter().map(|v| v.to_string()).collect())),
        "fail" => Err(ProgramFault {
            message: args.first().map(|m| m.to_string()).unwrap_or_default(),
            payload: error_object(args),
        }),
        "taint" => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            let label = args.get(1).cloned().unwrap_or(Value::str("source"));
            Ok(Value::object([("__taint", label), ("value", value)]))
        }
        "Error" => Ok(error_object(args)),
        "Array" => Ok(Value::Array(args.to_vec())),
        "Object" => Ok(Value::object(Vec::<(String, Value)>::new())),
        other => Err(type_error(format!("{} is not defined", other))),
    }
}
