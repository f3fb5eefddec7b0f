//! Request keys: a search request minus its paging window.
//!
//! Two requests that differ only in the page they ask for must map to the same
//! cache entry. [`RequestKey::from_request`] serializes a request to JSON,
//! drops its paging field and sorts every object by key, so the canonical text
//! is stable regardless of field order.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::segment::PagingWindow;

/// Field name conventionally carrying the paging window of a request.
pub const DEFAULT_PAGING_FIELD: &str = "paging";

/// Canonical identity of a search request, excluding its paging window.
///
/// Equality and hashing use the canonical text only.
#[derive(Clone)]
pub struct RequestKey {
    canonical: Arc<str>,
    payload: Arc<Value>,
}

impl RequestKey {
    /// Key for `request`, ignoring its `paging` field.
    pub fn from_request<T: Serialize>(request: &T) -> serde_json::Result<Self> {
        Self::from_request_without(request, DEFAULT_PAGING_FIELD)
    }

    /// Key for `request`, ignoring the top-level field `paging_field`.
    pub fn from_request_without<T: Serialize>(
        request: &T,
        paging_field: &str,
    ) -> serde_json::Result<Self> {
        let mut value = serde_json::to_value(request)?;
        if let Value::Object(fields) = &mut value {
            fields.remove(paging_field);
        }
        Self::from_payload(value)
    }

    /// Key for an already unpaged payload.
    pub fn from_payload(payload: Value) -> serde_json::Result<Self> {
        let payload = canonicalize(payload);
        let canonical = serde_json::to_string(&payload)?;
        Ok(Self {
            canonical: canonical.into(),
            payload: Arc::new(payload),
        })
    }

    /// Key for a bare query label, e.g. a search string.
    pub fn named(label: &str) -> Self {
        let payload = Value::String(label.to_owned());
        Self {
            canonical: payload.to_string().into(),
            payload: Arc::new(payload),
        }
    }

    /// The canonical JSON text this key hashes on.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The unpaged request payload, for searchers that need to rebuild it.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The payload with `window` written back under the default paging field.
    ///
    /// Non-object payloads are wrapped as `{ "request": .., "paging": .. }`.
    pub fn payload_with_paging(&self, window: PagingWindow) -> Value {
        let paging = serde_json::json!({ "first": window.first(), "last": window.last() });
        match self.payload.as_ref() {
            Value::Object(fields) => {
                let mut fields = fields.clone();
                fields.insert(DEFAULT_PAGING_FIELD.to_owned(), paging);
                Value::Object(fields)
            }
            other => serde_json::json!({ "request": other, DEFAULT_PAGING_FIELD: paging }),
        }
    }
}

/// Rebuild every object with its keys in sorted order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let sorted: BTreeMap<String, Value> = fields
                .into_iter()
                .map(|(name, value)| (name, canonicalize(value)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey").field(&self.canonical).finish()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct SecuritySearch {
        name: String,
        sort: String,
        paging: Option<(usize, usize)>,
    }

    #[test]
    fn test_paging_is_ignored() {
        let first_page = SecuritySearch {
            name: "AAPL*".into(),
            sort: "name_asc".into(),
            paging: Some((0, 20)),
        };
        let second_page = SecuritySearch {
            name: "AAPL*".into(),
            sort: "name_asc".into(),
            paging: Some((20, 40)),
        };

        let a = RequestKey::from_request(&first_page).unwrap();
        let b = RequestKey::from_request(&second_page).unwrap();
        assert_eq!(a, b);
        assert!(!a.canonical().contains("paging"));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = RequestKey::from_payload(serde_json::json!({ "b": 1, "a": { "y": 2, "x": 3 } }))
            .unwrap();
        let b = RequestKey::from_payload(serde_json::json!({ "a": { "x": 3, "y": 2 }, "b": 1 }))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn test_different_filters_differ() {
        let a = RequestKey::from_payload(serde_json::json!({ "name": "A*" })).unwrap();
        let b = RequestKey::from_payload(serde_json::json!({ "name": "B*" })).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_with_paging() {
        let key = RequestKey::from_payload(serde_json::json!({ "name": "A*" })).unwrap();
        let paged = key.payload_with_paging(PagingWindow::of_range(20, 40).unwrap());
        assert_eq!(paged["paging"]["first"], 20);
        assert_eq!(paged["name"], "A*");

        let named = RequestKey::named("everything");
        let paged = named.payload_with_paging(PagingWindow::of_range(0, 10).unwrap());
        assert_eq!(paged["request"], "everything");
    }
}
