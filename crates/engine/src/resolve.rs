//! Bound-value resolution.
//!
//! Turns a [`BoundValue`] into the concrete JSON value a component renders.
//! Literals resolve to their payload without touching any state. Paths are
//! looked up through a [`ValueSource`], usually the [`DataStore`] effective
//! view. An unresolvable path yields `None`; resolution never fails.
//!
//! The `resolve_as_*` helpers coerce results for presentation shells that
//! need a specific primitive.

use serde_json::{Map, Value};
use trellis_types::BoundValue;
use trellis_util::get_in;

use crate::store::{DataStore, PathContext};

/// Anything paths can be resolved against.
pub trait ValueSource {
    fn lookup(&self, context: &PathContext, path: &str) -> Option<Value>;
}

impl ValueSource for DataStore {
    fn lookup(&self, context: &PathContext, path: &str) -> Option<Value> {
        self.resolve_path(context, path)
    }
}

/// A bare document, handy for previews that have no store.
impl ValueSource for Map<String, Value> {
    fn lookup(&self, _context: &PathContext, path: &str) -> Option<Value> {
        get_in(self, path).cloned()
    }
}

/// Resolves a binding. Never applies the binding's preview default.
pub fn resolve(bound: &BoundValue, source: &impl ValueSource, context: &PathContext) -> Option<Value> {
    match bound {
        BoundValue::Literal(literal) => Some(literal.to_json()),
        BoundValue::Path(binding) => source.lookup(context, &binding.path),
    }
}

/// Resolves a binding, falling back to its `defaultValue` when the path is
/// unresolved.
pub fn resolve_or_default(bound: &BoundValue, source: &impl ValueSource, context: &PathContext) -> Option<Value> {
    resolve(bound, source, context).or_else(|| bound.default_value().cloned())
}

/// Resolves to display text. Strings are returned as-is, `null` as empty,
/// everything else as its JSON text.
pub fn resolve_as_string(bound: &BoundValue, source: &impl ValueSource, context: &PathContext) -> Option<String> {
    resolve(bound, source, context).map(|value| match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Resolves to a number, parsing numeric strings.
pub fn resolve_as_number(bound: &BoundValue, source: &impl ValueSource, context: &PathContext) -> Option<f64> {
    match resolve(bound, source, context)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Resolves to a boolean using JSON truthiness; `"true"`/`"false"` strings
/// are parsed.
pub fn resolve_as_bool(bound: &BoundValue, source: &impl ValueSource, context: &PathContext) -> Option<bool> {
    let value = resolve(bound, source, context)?;
    Some(match value {
        Value::Bool(flag) => flag,
        Value::Null => false,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" | "" | "0" => false,
            _ => true,
        },
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    })
}
