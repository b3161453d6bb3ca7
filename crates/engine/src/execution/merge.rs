//! Overlaying user-entered values onto cached element descriptors.
//!
//! Cached descriptors reflect the surface as the backend last described it.
//! Values the user typed since then live in the element value ledger; before
//! a board runs, each cached element with a ledger entry is cloned and its
//! value property replaced by a literal of the ledger value.
//!
//! The overlay is lossy for values without a literal case: `null` is sent as
//! an empty `literalString` and objects as a `literalString` of their JSON
//! text. Boards that need structured input should read it from page state
//! instead.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use trellis_types::BoundValue;

use crate::dispatch::ElementValueLedger;

/// Component kinds whose value property is `checked`.
const CHECKED_KINDS: &[&str] = &["checkbox", "switch", "toggle"];

/// Returns the elements with ledger values applied. Elements without a
/// ledger entry are returned unchanged.
pub fn merge_ledger(elements: &IndexMap<String, Value>, ledger: &ElementValueLedger) -> IndexMap<String, Value> {
    elements
        .iter()
        .map(|(address, descriptor)| {
            let merged = match ledger.get(address) {
                Some(value) => with_value(descriptor, value),
                None => descriptor.clone(),
            };
            (address.clone(), merged)
        })
        .collect()
}

/// Name of the bound property carrying a component's value.
pub fn value_property(descriptor: &Value) -> &'static str {
    let kind = component_kind(descriptor).map(str::to_ascii_lowercase);
    match kind {
        Some(kind) if CHECKED_KINDS.contains(&kind.as_str()) => "checked",
        _ => "value",
    }
}

/// Data path the descriptor's value property is bound to, if it is a path
/// binding.
pub fn bound_path(descriptor: &Value) -> Option<String> {
    let binding = props(descriptor)?.get(value_property(descriptor))?;
    let bound = BoundValue::deserialize(binding).ok()?;
    bound.as_path().map(str::to_owned)
}

/// Clone of `descriptor` whose value property is a literal of `value`.
pub fn with_value(descriptor: &Value, value: &Value) -> Value {
    let mut merged = descriptor.clone();
    let property = value_property(descriptor);
    if let Some(props) = props_mut(&mut merged) {
        props.insert(property.to_string(), BoundValue::literal_json(value).to_json());
    }
    merged
}

/// Descriptors either nest their properties under `component` or carry them
/// inline.
fn props(descriptor: &Value) -> Option<&Map<String, Value>> {
    let root = descriptor.as_object()?;
    match root.get("component") {
        Some(Value::Object(component)) => Some(component),
        _ => Some(root),
    }
}

fn props_mut(descriptor: &mut Value) -> Option<&mut Map<String, Value>> {
    let root = descriptor.as_object_mut()?;
    if root.get("component").is_some_and(Value::is_object) {
        return root.get_mut("component").and_then(Value::as_object_mut);
    }
    Some(root)
}

fn component_kind(descriptor: &Value) -> Option<&str> {
    let nested = descriptor.get("component").filter(|component| component.is_object());
    nested
        .and_then(|component| component.get("type"))
        .or_else(|| descriptor.get("type"))
        .or_else(|| descriptor.get("kind"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ledger_with(entries: &[(&str, &str, Value)]) -> ElementValueLedger {
        let mut ledger = ElementValueLedger::new();
        for (surface, component, value) in entries {
            ledger.record(surface, component, value.clone());
        }
        ledger
    }

    #[test]
    fn ledger_values_override_cached_descriptors() {
        let mut elements = IndexMap::new();
        elements.insert(
            "main/name".to_string(),
            json!({"id": "name", "component": {"type": "textField", "value": {"literalString": "old"}}}),
        );
        elements.insert("main/title".to_string(), json!({"id": "title", "type": "text", "value": {"literalString": "Hi"}}));
        let ledger = ledger_with(&[("main", "name", json!("new"))]);

        let merged = merge_ledger(&elements, &ledger);

        assert_eq!(merged["main/name"]["component"]["value"], json!({"literalString": "new"}));
        assert_eq!(merged["main/title"], elements["main/title"]);
        assert_eq!(elements["main/name"]["component"]["value"], json!({"literalString": "old"}));
    }

    #[test]
    fn toggles_use_checked() {
        let descriptor = json!({"id": "agree", "type": "Checkbox", "checked": {"path": "/form/agree"}});
        let merged = with_value(&descriptor, &json!(true));
        assert_eq!(merged["checked"], json!({"literalBool": true}));
        assert!(merged.get("value").is_none());
    }

    #[test]
    fn non_scalar_values_become_literals() {
        let descriptor = json!({"id": "tags", "type": "select"});
        assert_eq!(with_value(&descriptor, &json!(["a", "b"]))["value"], json!({"literalOptions": ["a", "b"]}));
        assert_eq!(with_value(&descriptor, &Value::Null)["value"], json!({"literalString": ""}));
        assert_eq!(with_value(&descriptor, &json!(4))["value"], json!({"literalNumber": 4.0}));
    }

    #[test]
    fn object_values_travel_as_json_text() {
        let descriptor = json!({"id": "address", "type": "textField"});
        let merged = with_value(&descriptor, &json!({"city": "Oslo"}));
        assert_eq!(merged["value"], json!({"literalString": "{\"city\":\"Oslo\"}"}));
    }

    #[test]
    fn bound_path_reads_the_value_property() {
        assert_eq!(
            bound_path(&json!({"id": "name", "component": {"type": "textField", "value": {"path": "/form/name"}}})),
            Some("/form/name".to_string())
        );
        assert_eq!(
            bound_path(&json!({"id": "agree", "type": "switch", "checked": {"path": "form.agree"}, "value": {"path": "x"}})),
            Some("form.agree".to_string())
        );
        assert_eq!(bound_path(&json!({"id": "title", "type": "text", "value": {"literalString": "Hi"}})), None);
        assert_eq!(bound_path(&json!({"id": "bad", "type": "textField", "value": {"path": "a", "literalString": "b"}})), None);
        assert_eq!(bound_path(&json!({"id": "pay", "type": "button"})), None);
    }
}
