use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one batched read: variable name to current value.
pub type ValueMap = BTreeMap<String, PlcValue>;

/// Element of an ordered sequence read from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// A value read from the controller.
///
/// Equality follows the change-detection rules rather than structural
/// identity:
/// - numbers, strings and booleans compare by value (`NaN` never equals itself)
/// - two timestamps are equal when they denote the same instant
/// - two sequences are equal when they have the same length and every
///   position holds an equal scalar
/// - values of different kinds are never equal; `Null` only equals `Null`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PlcValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Sequence(Vec<Scalar>),
}

impl PlcValue {
    /// Convert into a JSON payload. Timestamps become epoch milliseconds.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PlcValue::Null => serde_json::Value::Null,
            PlcValue::Bool(v) => serde_json::Value::Bool(*v),
            PlcValue::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PlcValue::Text(v) => serde_json::Value::String(v.clone()),
            PlcValue::Timestamp(v) => serde_json::Value::from(v.timestamp_millis()),
            PlcValue::Sequence(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Scalar::Bool(v) => serde_json::Value::Bool(*v),
                        Scalar::Number(v) => serde_json::Number::from_f64(*v)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null),
                        Scalar::Text(v) => serde_json::Value::String(v.clone()),
                    })
                    .collect(),
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlcValue::Null => "null",
            PlcValue::Bool(_) => "bool",
            PlcValue::Number(_) => "number",
            PlcValue::Text(_) => "text",
            PlcValue::Timestamp(_) => "timestamp",
            PlcValue::Sequence(_) => "sequence",
        }
    }
}

impl PartialEq for PlcValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PlcValue::Null, PlcValue::Null) => true,
            (PlcValue::Bool(a), PlcValue::Bool(b)) => a == b,
            (PlcValue::Number(a), PlcValue::Number(b)) => a == b,
            (PlcValue::Text(a), PlcValue::Text(b)) => a == b,
            (PlcValue::Timestamp(a), PlcValue::Timestamp(b)) => a == b,
            (PlcValue::Sequence(a), PlcValue::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

/// Compare a cached value against a freshly read one.
///
/// A key that has never been observed is always considered changed.
pub fn values_equal(cached: Option<&PlcValue>, current: &PlcValue) -> bool {
    match cached {
        Some(previous) => previous == current,
        None => false,
    }
}

impl From<bool> for PlcValue {
    fn from(v: bool) -> Self {
        PlcValue::Bool(v)
    }
}

impl From<f64> for PlcValue {
    fn from(v: f64) -> Self {
        PlcValue::Number(v)
    }
}

impl From<i64> for PlcValue {
    fn from(v: i64) -> Self {
        PlcValue::Number(v as f64)
    }
}

impl From<i32> for PlcValue {
    fn from(v: i32) -> Self {
        PlcValue::Number(f64::from(v))
    }
}

impl From<&str> for PlcValue {
    fn from(v: &str) -> Self {
        PlcValue::Text(v.to_string())
    }
}

impl From<String> for PlcValue {
    fn from(v: String) -> Self {
        PlcValue::Text(v)
    }
}

impl From<DateTime<Utc>> for PlcValue {
    fn from(v: DateTime<Utc>) -> Self {
        PlcValue::Timestamp(v)
    }
}

impl From<Vec<Scalar>> for PlcValue {
    fn from(v: Vec<Scalar>) -> Self {
        PlcValue::Sequence(v)
    }
}

impl From<Vec<f64>> for PlcValue {
    fn from(v: Vec<f64>) -> Self {
        PlcValue::Sequence(v.into_iter().map(Scalar::Number).collect())
    }
}
