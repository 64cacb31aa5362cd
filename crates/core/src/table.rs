use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed field values as they arrive from a source; nothing is trusted to be numeric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl RawValue {
    /// Numeric coercion. Anything that is not a finite number is treated as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Float(v) if v.is_finite() => Some(*v),
            RawValue::Float(_) => None,
            RawValue::Integer(v) => Some(*v as f64),
            RawValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            RawValue::Null => None,
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    RawValue::Float(f)
                } else {
                    RawValue::Text(n.to_string())
                }
            }
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

/// One row as returned by a data source: a timestamp plus loosely typed fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRow {
    pub timestamp: DateTime<Utc>,
    pub fields: HashMap<String, RawValue>,
}

impl RawRow {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: HashMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }
}

/// Rows in arrival order. May be unsorted, duplicated, or empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn push(&mut self, row: RawRow) {
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion() {
        assert_eq!(RawValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(RawValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(RawValue::Text(" 2.25 ".into()).as_f64(), Some(2.25));
        assert_eq!(RawValue::Text("ERR".into()).as_f64(), None);
        assert_eq!(RawValue::Float(f64::NAN).as_f64(), None);
        assert_eq!(RawValue::Null.as_f64(), None);
    }

    #[test]
    fn from_json_preserves_kind() {
        let v: serde_json::Value = serde_json::json!({"a": 1, "b": 1.5, "c": "x", "d": null});
        assert_eq!(RawValue::from_json(&v["a"]), RawValue::Integer(1));
        assert_eq!(RawValue::from_json(&v["b"]), RawValue::Float(1.5));
        assert_eq!(RawValue::from_json(&v["c"]), RawValue::Text("x".into()));
        assert_eq!(RawValue::from_json(&v["d"]), RawValue::Null);
    }
}
