//! Path helpers for addressing values nested inside a bucket.
//!
//! A path is a list of segments. Object members are addressed by key, array
//! elements by their decimal index. Paths render as RFC 6901 JSON pointers
//! (`/patients/p1/allergies/0`) for display and error messages.

use serde_json::Value;

/// Follow `path` from `root`, returning the value it lands on.
pub(crate) fn resolve<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => parse_index(segment).and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Mutable counterpart of [`resolve`].
pub(crate) fn resolve_mut<'a>(root: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => parse_index(segment).and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Parse an array index segment. Leading zeros and signs are rejected.
pub(crate) fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Render a path as a JSON pointer.
pub fn to_pointer(path: &[String]) -> String {
    path.iter()
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
}

/// Parse a JSON pointer into path segments.
///
/// The empty string addresses the root. Any other pointer must start with `/`.
pub fn parse_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(
        rest.split('/')
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}

/// Returns `true` if values of this JSON type get a tracked view when read.
pub(crate) fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}
