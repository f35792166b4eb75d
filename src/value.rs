//! Structural helpers over JSON values: dot-path lookup and deep merge.

use serde_json::Value;

/// Resolves a dot-path (`"a.b.c"`) inside `value`.
///
/// An empty path resolves to the value itself. Only object members are
/// traversed; arrays are leaves.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Merges `patch` into `base`.
///
/// - array onto array: concatenated
/// - object onto object: merged field by field, recursively
/// - anything else: `patch` replaces `base`
pub fn merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Array(mut base), Value::Array(patch)) => {
            base.extend(patch);
            Value::Array(base)
        },
        (Value::Object(mut base), Value::Object(patch)) => {
            for (field, incoming) in patch {
                let merged = match base.remove(&field) {
                    Some(existing) => merge(existing, incoming),
                    None => incoming,
                };
                base.insert(field, merged);
            }
            Value::Object(base)
        },
        (_, patch) => patch,
    }
}
