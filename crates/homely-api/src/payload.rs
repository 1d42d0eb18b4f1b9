//! Safe, typed access into untyped JSON payloads.
//!
//! Event envelopes from the channel are plain [`serde_json::Value`] trees
//! whose shape is not contractually fixed. [`extract`] walks such a tree by
//! a path of keys and converts the leaf into the requested type, returning
//! an [`ExtractError`] describing what went wrong instead of panicking.
//!
//! ```rust
//! use homely_api::payload::extract;
//! use serde_json::json;
//!
//! let ev = json!({ "data": { "deviceId": "abc", "changes": [] } });
//! let id: String = extract(&ev, &["data", "deviceId"]).unwrap();
//! assert_eq!(id, "abc");
//! assert!(extract::<String>(&ev, &["data", "missing"]).is_err());
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Why a path lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("empty key path")]
    EmptyPath,

    /// An intermediate (or the final parent) node was not a mapping.
    #[error("expected a mapping at `{path}`, found {found}")]
    NotAMapping { path: String, found: &'static str },

    #[error("missing key `{path}`")]
    MissingKey { path: String },

    #[error("value at `{path}` is {found}, expected {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Types that can be produced from a JSON leaf.
pub trait FromPayload: Sized {
    /// Human-readable name used in [`ExtractError::WrongType`].
    const EXPECTED: &'static str;

    fn from_payload(value: &Value) -> Option<Self>;
}

impl FromPayload for Value {
    const EXPECTED: &'static str = "any value";

    fn from_payload(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromPayload for String {
    const EXPECTED: &'static str = "a string";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_str().map(String::from)
    }
}

impl FromPayload for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromPayload for f64 {
    const EXPECTED: &'static str = "a number";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromPayload for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromPayload for Vec<Value> {
    const EXPECTED: &'static str = "a sequence";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }
}

impl FromPayload for Map<String, Value> {
    const EXPECTED: &'static str = "a mapping";

    fn from_payload(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

/// ISO-8601 / RFC 3339 timestamps carried as strings.
impl FromPayload for DateTime<Utc> {
    const EXPECTED: &'static str = "an ISO-8601 timestamp";

    fn from_payload(value: &Value) -> Option<Self> {
        let s = value.as_str()?;
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// JSON kind name for diagnostics.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Walk `keys` from `root` and borrow the leaf without converting it.
///
/// Every node before the last key must be a mapping containing the next
/// key.
pub fn lookup<'a>(root: &'a Value, keys: &[&str]) -> Result<&'a Value, ExtractError> {
    if keys.is_empty() {
        return Err(ExtractError::EmptyPath);
    }

    let mut current = root;
    for (depth, key) in keys.iter().enumerate() {
        let Some(map) = current.as_object() else {
            let err = ExtractError::NotAMapping {
                path: join(&keys[..depth]),
                found: kind_of(current),
            };
            debug!(error = %err, "payload lookup failed");
            return Err(err);
        };
        let Some(next) = map.get(*key) else {
            let err = ExtractError::MissingKey {
                path: join(&keys[..=depth]),
            };
            debug!(error = %err, "payload lookup failed");
            return Err(err);
        };
        current = next;
    }
    Ok(current)
}

/// Walk `keys` from `root` and convert the leaf into `V`.
pub fn extract<V: FromPayload>(root: &Value, keys: &[&str]) -> Result<V, ExtractError> {
    let leaf = lookup(root, keys)?;
    V::from_payload(leaf).ok_or_else(|| {
        let err = ExtractError::WrongType {
            path: join(keys),
            expected: V::EXPECTED,
            found: kind_of(leaf),
        };
        debug!(error = %err, "payload conversion failed");
        err
    })
}

fn join(keys: &[&str]) -> String {
    if keys.is_empty() {
        "<root>".into()
    } else {
        keys.join(".")
    }
}

// ── Tests ────────────────────────────────────────────────────────────
