//! Data-model paths and JSON document traversal.
//!
//! Paths address locations inside a surface document and accept three
//! notations, which may be mixed:
//!
//! - slash form: `/user/profile/name` (a leading `/` is optional)
//! - dot form: `user.profile.name`
//! - bracket indices: `items[3].label`
//!
//! A bare numeric segment (`items/3`) indexes arrays and keys objects, so the
//! same path works whichever container it meets. Documents are JSON objects;
//! the first segment of a path is always an object key and is called the
//! root key.

use serde_json::{Map, Value};

/// Most `null` slots a single write may pad an array with.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(key) => key.parse().ok(),
        }
    }

    fn into_key(self) -> String {
        match self {
            Self::Key(key) => key,
            Self::Index(index) => index.to_string(),
        }
    }
}

/// Splits a path into segments. Empty segments are skipped, so `"/a//b/"`
/// and `"a.b"` parse identically. Malformed brackets are read as keys.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.trim().split(['/', '.']) {
        if part.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(part);
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        segments.extend(indices.into_iter().map(PathSegment::Index));
    }
    segments
}

/// Returns the root key of a path, i.e. the top-level document entry it
/// lives under.
pub fn root_key(path: &str) -> Option<String> {
    parse_path(path).into_iter().next().map(PathSegment::into_key)
}

/// Looks a path up inside a document.
pub fn get_in<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = parse_path(path).into_iter();
    let root = segments.next()?.into_key();
    let mut current = document.get(&root)?;
    for segment in segments {
        current = step(current, &segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate containers as needed.
///
/// A missing container becomes an array when the next segment is a bracket
/// index and an object otherwise. Writing past the end of an array pads it
/// with `null`, up to [`MAX_ARRAY_PADDING`] slots. A scalar met midway is
/// replaced by a container. Returns the root key that was touched, or `None`
/// when the path is empty or would pad an array beyond the limit; the
/// document is left untouched in that case.
pub fn set_in(document: &mut Map<String, Value>, path: &str, value: Value) -> Option<String> {
    let mut segments = parse_path(path);
    if segments.is_empty() {
        return None;
    }
    let root = segments.remove(0).into_key();
    if segments.is_empty() {
        document.insert(root.clone(), value);
        return Some(root);
    }
    if !fits(document.get(&root), &segments) {
        return None;
    }

    let slot = document
        .entry(root.clone())
        .or_insert_with(|| empty_container_for(&segments[0]));
    assign(slot, &segments, value);
    Some(root)
}

/// Removes the value at `path` and returns it.
pub fn remove_in(document: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let mut segments = parse_path(path);
    let last = segments.pop()?;
    if segments.is_empty() {
        return document.remove(&last.into_key());
    }

    let root = segments.remove(0).into_key();
    let mut current = document.get_mut(&root)?;
    for segment in &segments {
        current = step_mut(current, segment)?;
    }
    match current {
        Value::Object(map) => map.remove(&last.into_key()),
        Value::Array(items) => {
            let index = last.as_index()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

fn step<'a>(current: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match current {
        Value::Object(map) => match segment {
            PathSegment::Key(key) => map.get(key),
            PathSegment::Index(index) => map.get(&index.to_string()),
        },
        Value::Array(items) => items.get(segment.as_index()?),
        _ => None,
    }
}

fn step_mut<'a>(current: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match current {
        Value::Object(map) => match segment {
            PathSegment::Key(key) => map.get_mut(key),
            PathSegment::Index(index) => map.get_mut(&index.to_string()),
        },
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

/// Checks, without mutating, that writing `segments` below `target` stays
/// within the array padding limit.
fn fits(target: Option<&Value>, segments: &[PathSegment]) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return true;
    };
    let child = match (target, segment.as_index()) {
        (Some(Value::Object(map)), _) => map.get(&segment.clone().into_key()),
        (Some(Value::Array(items)), Some(index)) => {
            if !within_padding(items.len(), index) {
                return false;
            }
            items.get(index)
        }
        _ => {
            // Replaced by a fresh container, which is an array only for
            // bracket indices.
            if let PathSegment::Index(index) = segment
                && !within_padding(0, *index)
            {
                return false;
            }
            None
        }
    };
    fits(child, rest)
}

fn within_padding(len: usize, index: usize) -> bool {
    index.checked_sub(len).is_none_or(|gap| gap < MAX_ARRAY_PADDING)
}

fn assign(target: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    let keyed_array = target.is_array() && segment.as_index().is_none();
    if keyed_array || !matches!(target, Value::Object(_) | Value::Array(_)) {
        *target = empty_container_for(segment);
    }

    let child = match target {
        Value::Array(items) => {
            let Some(index) = segment.as_index() else {
                return;
            };
            if index >= items.len() {
                let Some(len) = index.checked_add(1) else {
                    return;
                };
                items.resize(len, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.clone().into_key()).or_insert(Value::Null),
        _ => return,
    };

    if rest.is_empty() {
        *child = value;
    } else {
        assign(child, rest, value);
    }
}

fn empty_container_for(next: &PathSegment) -> Value {
    match next {
        PathSegment::Index(_) => Value::Array(Vec::new()),
        PathSegment::Key(_) => Value::Object(Map::new()),
    }
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let mut indices = Vec::new();
    let mut rest = &segment[open..];
    while let Some(body) = rest.strip_prefix('[') {
        let Some(close) = body.find(']') else {
            return (segment, Vec::new());
        };
        match body[..close].trim().parse::<usize>() {
            Ok(index) => indices.push(index),
            Err(_) => return (segment, Vec::new()),
        }
        rest = &body[close + 1..];
    }
    if !rest.is_empty() {
        return (segment, Vec::new());
    }
    (&segment[..open], indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn notations_parse_to_the_same_segments() {
        let expected = vec![
            PathSegment::Key("items".into()),
            PathSegment::Index(3),
            PathSegment::Key("label".into()),
        ];
        assert_eq!(parse_path("items[3].label"), expected);
        assert_eq!(parse_path("/items[3]/label"), expected);
        assert_eq!(parse_path(" items[3]/label/ "), expected);
        assert_eq!(parse_path("items/3/label")[1], PathSegment::Key("3".into()));
    }

    #[test]
    fn malformed_brackets_stay_keys() {
        assert_eq!(parse_path("a[x]"), vec![PathSegment::Key("a[x]".into())]);
        assert_eq!(parse_path("a[1"), vec![PathSegment::Key("a[1".into())]);
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let doc = document(json!({"user": {"tags": ["a", "b"], "profile": {"name": "Ada"}}}));
        assert_eq!(get_in(&doc, "/user/profile/name"), Some(&json!("Ada")));
        assert_eq!(get_in(&doc, "user.tags[1]"), Some(&json!("b")));
        assert_eq!(get_in(&doc, "user/tags/0"), Some(&json!("a")));
        assert_eq!(get_in(&doc, "user.tags[5]"), None);
        assert_eq!(get_in(&doc, "user.profile.name.first"), None);
        assert_eq!(get_in(&doc, ""), None);
    }

    #[test]
    fn set_creates_containers_and_pads_arrays() {
        let mut doc = Map::new();
        assert_eq!(set_in(&mut doc, "form.rows[2].label", json!("third")), Some("form".to_string()));
        assert_eq!(
            Value::Object(doc.clone()),
            json!({"form": {"rows": [null, null, {"label": "third"}]}})
        );

        set_in(&mut doc, "form.rows[0]", json!("first"));
        assert_eq!(get_in(&doc, "form.rows[0]"), Some(&json!("first")));
    }

    #[test]
    fn oversized_indices_are_rejected_without_touching_the_document() {
        let mut doc = document(json!({"items": [1, 2]}));
        assert_eq!(set_in(&mut doc, "items[18446744073709551615]", json!(1)), None);
        assert_eq!(set_in(&mut doc, "items[4000000000]", json!(1)), None);
        assert_eq!(set_in(&mut doc, "fresh.rows[5000].label", json!("x")), None);
        assert_eq!(set_in(&mut doc, "items/99999", json!(1)), None);
        assert_eq!(Value::Object(doc.clone()), json!({"items": [1, 2]}));

        let edge = 2 + MAX_ARRAY_PADDING - 1;
        assert!(set_in(&mut doc, &format!("items[{edge}]"), json!("last")).is_some());
        assert_eq!(get_in(&doc, &format!("items[{edge}]")), Some(&json!("last")));
    }

    #[test]
    fn set_replaces_scalars_on_the_way() {
        let mut doc = document(json!({"user": "anonymous"}));
        set_in(&mut doc, "/user/name", json!("Ada"));
        assert_eq!(Value::Object(doc), json!({"user": {"name": "Ada"}}));
    }

    #[test]
    fn remove_deletes_nested_locations() {
        let mut doc = document(json!({"cart": {"items": [1, 2, 3], "coupon": "X"}}));
        assert_eq!(remove_in(&mut doc, "cart.coupon"), Some(json!("X")));
        assert_eq!(remove_in(&mut doc, "cart.items[1]"), Some(json!(2)));
        assert_eq!(remove_in(&mut doc, "cart.items[9]"), None);
        assert_eq!(Value::Object(doc.clone()), json!({"cart": {"items": [1, 3]}}));
        assert_eq!(remove_in(&mut doc, "/cart"), Some(json!({"items": [1, 3]})));
        assert!(doc.is_empty());
    }

    #[test]
    fn root_key_is_first_segment() {
        assert_eq!(root_key("/user/profile"), Some("user".to_string()));
        assert_eq!(root_key("items[0]"), Some("items".to_string()));
        assert_eq!(root_key("   "), None);
    }
}
