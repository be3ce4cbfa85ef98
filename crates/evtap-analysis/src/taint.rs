//! Taint inspection helpers for analyses.
//!
//! A value is tainted when it is an object with an own [`TAINT_KEY`]
//! property. Containers are searched up to a caller-chosen depth; depth 0
//! inspects only the value itself.

use evtap_core::Value;

pub const TAINT_KEY: &str = "__taint";

fn own_taint(value: &Value) -> Option<&Value> {
    value.get_own(TAINT_KEY)
}

fn children(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(fields) => Box::new(
            fields
                .iter()
                .filter(|(k, _)| k.as_str() != TAINT_KEY)
                .map(|(_, v)| v),
        ),
        _ => Box::new(std::iter::empty()),
    }
}

pub fn has_taint(value: &Value, depth: usize) -> bool {
    if own_taint(value).is_some() {
        return true;
    }
    depth > 0 && children(value).any(|child| has_taint(child, depth - 1))
}

/// Every taint label reachable within `depth`, outermost first.
pub fn collect_taints(value: &Value, depth: usize) -> Vec<Value> {
    let mut found = Vec::new();
    collect_into(value, depth, &mut found);
    found
}

fn collect_into(value: &Value, depth: usize, found: &mut Vec<Value>) {
    if let Some(label) = own_taint(value) {
        found.push(label.clone());
    }
    if depth == 0 {
        return;
    }
    for child in children(value) {
        collect_into(child, depth - 1, found);
    }
}
