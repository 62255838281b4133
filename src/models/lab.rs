use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::de;
use super::enums::Sex;
use super::ValidationError;

/// Leading number, optionally behind a comparator, after thousands separators
/// are removed. Trailing unit text ("11.2 g/dL") is allowed.
static RE_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[<>≤≥]=?\s*)?([-+]?(?:\d+(?:\.\d+)?|\.\d+))(?:\s|[a-zA-Zµμ%/^*]|$)")
        .unwrap()
});

/// A lab value exactly as the document printed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl Default for RawValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl RawValue {
    /// Numeric reading, or `None` for qualitative values ("Positive", "Nil").
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Text(s) => parse_numeric(s),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

/// Parse a numeric-looking lab string: "9.0", "1,50,000", "11.2 g/dL", "<0.5".
pub fn parse_numeric(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let caps = RE_NUMERIC.captures(&cleaned)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    value.is_finite().then_some(value)
}

/// `null` or a non-scalar value reads as an empty printed value, so the row
/// survives and is counted as unclassifiable.
fn raw_value_or_empty<'de, D>(deserializer: D) -> Result<RawValue, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map_or_else(RawValue::default, RawValue::Number),
        Value::String(s) => RawValue::Text(s),
        Value::Bool(b) => RawValue::Text(b.to_string()),
        _ => RawValue::default(),
    })
}

/// One test line from a lab report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTestObservation {
    #[serde(alias = "name", alias = "test")]
    pub test_name: String,
    #[serde(
        default,
        alias = "value",
        alias = "result",
        deserialize_with = "raw_value_or_empty"
    )]
    pub raw_value: RawValue,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub unit: Option<String>,
    #[serde(
        default,
        alias = "normal_range",
        alias = "reference",
        deserialize_with = "de::opt_string"
    )]
    pub reference_range: Option<String>,
    /// Report section, e.g. "Hematology".
    #[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Flag printed next to the value ("H", "L", "High"). Informational only.
    #[serde(
        default,
        alias = "flag",
        alias = "status",
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub reported_flag: Option<String>,
}

impl LabTestObservation {
    pub fn new(test_name: &str, raw_value: impl Into<RawValue>) -> Self {
        Self {
            test_name: test_name.to_string(),
            raw_value: raw_value.into(),
            unit: None,
            reference_range: None,
            section: None,
            reported_flag: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_range(mut self, range: &str) -> Self {
        self.reference_range = Some(range.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub sex: Option<Sex>,
}

impl Demographics {
    pub fn new(age: Option<u32>, sex: Option<Sex>) -> Self {
        Self { age, sex }
    }
}

/// Decode a caller-supplied observation list.
///
/// A non-array is a [`ValidationError`]. Individual elements missing a test
/// name or value are skipped, never fatal.
pub fn observations_from_json(value: &Value) -> Result<Vec<LabTestObservation>, ValidationError> {
    let items = value.as_array().ok_or_else(|| ValidationError::WrongShape {
        expected: "array of observations",
        found: json_kind(value).into(),
    })?;

    let observations: Vec<LabTestObservation> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            match serde_json::from_value::<LabTestObservation>(item.clone()) {
                Ok(obs) if !obs.test_name.trim().is_empty() && !obs.raw_value.is_empty() => {
                    Some(obs)
                }
                Ok(_) => {
                    tracing::debug!(index, "Skipping observation without name or value");
                    None
                }
                Err(e) => {
                    tracing::debug!(index, error = %e, "Skipping malformed observation");
                    None
                }
            }
        })
        .collect();

    if observations.len() < items.len() {
        tracing::warn!(
            received = items.len(),
            kept = observations.len(),
            "Dropped malformed lab observations"
        );
    }

    Ok(observations)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
