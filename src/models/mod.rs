pub mod document;
pub mod enums;
pub mod explanation;
pub mod lab;

pub use document::*;
pub use enums::*;
pub use explanation::*;
pub use lab::*;

use thiserror::Error;

/// Input rejected before any work is attempted. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Document is empty")]
    EmptyDocument,

    #[error("Invalid input: expected {expected}, got {found}")]
    WrongShape { expected: &'static str, found: String },
}

/// Tolerant deserializers for model-produced JSON.
///
/// Vision models emit `"age": 42` as often as `"age": "42"`, and `null`,
/// `""` or `"N/A"` for unreadable fields. These helpers fold all of that
/// into `Option<String>` / `Vec<String>` without failing the whole payload.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    const EMPTY_MARKERS: &[&str] = &["", "null", "none", "n/a", "na", "-", "not_found", "unknown"];

    pub fn scalar_to_string(value: &Value) -> Option<String> {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if EMPTY_MARKERS.contains(&text.to_lowercase().as_str()) {
            None
        } else {
            Some(text)
        }
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(scalar_to_string))
    }

    pub fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_string(deserializer)?.unwrap_or_default())
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(other) => scalar_to_string(&other).into_iter().collect(),
            None => Vec::new(),
        })
    }

    /// Deserialize an array, skipping elements that do not fit `T`.
    pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

}
