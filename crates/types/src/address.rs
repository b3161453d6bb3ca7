//! Element addressing helpers.
//!
//! An element address identifies a component within a surface and is written
//! as `"{surface_id}/{component_id}"`. Surface identifiers may themselves
//! contain slashes (route-like page ids), so splitting always happens on the
//! last separator.

/// Builds the `"{surface_id}/{component_id}"` address of a component.
pub fn element_address(surface_id: &str, component_id: &str) -> String {
    format!("{surface_id}/{component_id}")
}

/// Splits an element address into `(surface_id, component_id)`.
///
/// Returns `None` when the address has no separator or an empty component id.
pub fn split_element_address(address: &str) -> Option<(&str, &str)> {
    let (surface_id, component_id) = address.rsplit_once('/')?;
    if component_id.is_empty() {
        return None;
    }
    Some((surface_id, component_id))
}

/// Key under which execution element requirements are cached.
pub fn cache_key(board_id: &str, surface_id: &str) -> String {
    format!("{board_id}:{surface_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_uses_last_separator() {
        let address = element_address("/pages/home", "email");
        assert_eq!(address, "/pages/home/email");
        assert_eq!(split_element_address(&address), Some(("/pages/home", "email")));
    }

    #[test]
    fn split_rejects_missing_component() {
        assert_eq!(split_element_address("surface/"), None);
        assert_eq!(split_element_address("no-separator"), None);
    }
}
