//! The JSON-compatible value type shared by [`VariableScope`](crate::scope::VariableScope)
//! and the script engine bridge, plus opaque host-object handles.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value as Json;

use crate::host::HostObject;

/// A value bound in a [`VariableScope`](crate::scope::VariableScope).
///
/// Most values are plain JSON (`null`/bool/number/string/list/map); a
/// `Handle` wraps an opaque host object such as an HTTP client, a
/// browser driver, or a function closure. Handles are never deep-cloned:
/// they own OS resources and are shared by reference, per the `copy`
/// keyword's documented exemption. `Shared` wraps a map/list value a
/// shared-scope (`call`, bare form) call forked from the same backing
/// cell the caller holds, so the two scopes observe the identical
/// container rather than independent copies (spec §4.4 "Shared scope").
#[derive(Clone)]
pub enum ScopeValue {
    /// A JSON-compatible value.
    Json(Json),
    /// An opaque host object, shared by `Arc`.
    Handle(Arc<dyn HostObject>),
    /// A map/list value shared by reference between a caller's scope and
    /// a shared-scope call's child scope.
    Shared(Arc<Mutex<Json>>),
}

impl ScopeValue {
    /// Convenience constructor for `null`.
    #[must_use]
    pub fn null() -> Self {
        Self::Json(Json::Null)
    }

    /// Returns the underlying JSON value, if this is a plain (non-shared,
    /// non-handle) binding. Use [`Self::to_json`] to also read through a
    /// `Shared` cell.
    #[must_use]
    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Self::Json(v) => Some(v),
            Self::Handle(_) | Self::Shared(_) => None,
        }
    }

    /// Reads the current JSON content of this value, taking a snapshot of
    /// a `Shared` cell if needed. `None` only for host handles.
    #[must_use]
    pub fn to_json(&self) -> Option<Json> {
        match self {
            Self::Json(v) => Some(v.clone()),
            Self::Shared(cell) => Some(cell.lock().unwrap().clone()),
            Self::Handle(_) => None,
        }
    }

    /// Returns the underlying host handle, if this is one.
    #[must_use]
    pub fn as_handle(&self) -> Option<&Arc<dyn HostObject>> {
        match self {
            Self::Handle(h) => Some(h),
            Self::Json(_) | Self::Shared(_) => None,
        }
    }

    /// Wraps a map/list value in a freshly shared cell so a shared-scope
    /// call's child scope and the caller observe the same backing
    /// storage; scalars and already-shared/handle values are cloned by
    /// reference as usual (spec §4.4 "Shared scope": "the scope is not
    /// deep-copied").
    #[must_use]
    pub fn share_or_copy(&self) -> Self {
        match self {
            Self::Json(v @ (Json::Object(_) | Json::Array(_))) => Self::Shared(Arc::new(Mutex::new(v.clone()))),
            Self::Shared(cell) => Self::Shared(Arc::clone(cell)),
            other => other.clone(),
        }
    }

    /// Performs the deep clone that backs the `copy` keyword.
    ///
    /// JSON values are recursively cloned by value (`serde_json::Value`
    /// is itself structural, so a plain [`Clone`] already walks the
    /// tree); host handles are returned unchanged since they are shared
    /// by reference, not data; a `Shared` cell is read and turned into an
    /// independent `Json` snapshot, severing the sharing link (`copy`
    /// always produces an isolated value, even of a shared-scope
    /// binding).
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Json(v) => Self::Json(v.clone()),
            Self::Handle(h) => Self::Handle(Arc::clone(h)),
            Self::Shared(cell) => Self::Json(cell.lock().unwrap().clone()),
        }
    }

    /// True if this value would be considered "truthy" by a predicate
    /// step (used for mock-request matching and `match`/`assert`).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Json(v) => json_is_truthy(v),
            Self::Handle(_) => true,
            Self::Shared(cell) => json_is_truthy(&cell.lock().unwrap()),
        }
    }
}

fn json_is_truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Null => false,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Json::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "Json({v})"),
            Self::Handle(h) => write!(f, "Handle({})", h.type_name()),
            Self::Shared(cell) => write!(f, "Shared({})", cell.lock().unwrap()),
        }
    }
}

impl From<Json> for ScopeValue {
    fn from(v: Json) -> Self {
        Self::Json(v)
    }
}

impl From<Arc<dyn HostObject>> for ScopeValue {
    fn from(h: Arc<dyn HostObject>) -> Self {
        Self::Handle(h)
    }
}

/// Canonicalizes a JSON value to a stable string used for `argHash`:
/// map keys are sorted so structurally-equal argument maps hash equal
/// regardless of construction order.
#[must_use]
pub fn canonical_json(value: &Json) -> String {
    fn walk(value: &Json, out: &mut String) {
        match value {
            Json::Object(map) => {
                out.push('{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).unwrap_or_default());
                    out.push(':');
                    walk(&map[*k], out);
                }
                out.push('}');
            }
            Json::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    walk(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&serde_json::to_string(other).unwrap_or_default()),
        }
    }

    let mut out = String::new();
    walk(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let a = canonical_json(&json!({"b": 1, "a": 2}));
        let b = canonical_json(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn truthiness_matches_js_semantics() {
        assert!(!ScopeValue::Json(json!(0)).is_truthy());
        assert!(!ScopeValue::Json(json!("")).is_truthy());
        assert!(ScopeValue::Json(json!("x")).is_truthy());
        assert!(!ScopeValue::Json(Json::Null).is_truthy());
    }
}
