use std::collections::HashMap;

use serde_json::Value;
use trellis_types::element_address;

/// Last value a user entered into each element of the current page, keyed
/// by element address. Never persisted; cleared on navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementValueLedger {
    values: HashMap<String, Value>,
}

impl ElementValueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, surface_id: &str, component_id: &str, value: Value) {
        self.values.insert(element_address(surface_id, component_id), value);
    }

    /// Value recorded for an element address.
    pub fn get(&self, address: &str) -> Option<&Value> {
        self.values.get(address)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
