use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ResourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Quantity { value: f64, units: Option<String> },
    Boolean(bool),
    /// Selected enum item ids.
    Enum(Vec<ResourceId>),
    Reference(Vec<ResourceId>),
    Barcode(String),
    Narrative(String),
    GeoPoint { latitude: f64, longitude: f64 },
    Image { blob_id: String, mime_type: String },
    LocalDate(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
    LocalDateInterval { start: NaiveDate, end: NaiveDate },
    Instant(DateTime<Utc>),
    Expr(String),
    Record(Record),
    List(Vec<FieldValue>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (
                Self::Quantity { value: a, units: ua },
                Self::Quantity { value: b, units: ub },
            ) => a.total_cmp(b).is_eq() && ua == ub,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Barcode(a), Self::Barcode(b)) => a == b,
            (Self::Narrative(a), Self::Narrative(b)) => a == b,
            (
                Self::GeoPoint { latitude: a1, longitude: a2 },
                Self::GeoPoint { latitude: b1, longitude: b2 },
            ) => a1.total_cmp(b1).is_eq() && a2.total_cmp(b2).is_eq(),
            (
                Self::Image { blob_id: a, mime_type: ma },
                Self::Image { blob_id: b, mime_type: mb },
            ) => a == b && ma == mb,
            (Self::LocalDate(a), Self::LocalDate(b)) => a == b,
            (Self::Month { year: ya, month: ma }, Self::Month { year: yb, month: mb }) => {
                ya == yb && ma == mb
            }
            (Self::Year(a), Self::Year(b)) => a == b,
            (
                Self::LocalDateInterval { start: sa, end: ea },
                Self::LocalDateInterval { start: sb, end: eb },
            ) => sa == sb && ea == eb,
            (Self::Instant(a), Self::Instant(b)) => a == b,
            (Self::Expr(a), Self::Expr(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn quantity(value: f64) -> Self {
        Self::Quantity { value, units: None }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<f64> {
        match self {
            FieldValue::Quantity { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// A resource's typed value: field key to value. Unset fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(FieldValue::as_boolean)
    }

    pub fn get_record(&self, key: &str) -> Option<&Record> {
        self.get(key).and_then(FieldValue::as_record)
    }

    pub fn get_list(&self, key: &str) -> Option<&[FieldValue]> {
        self.get(key).and_then(FieldValue::as_list)
    }

    pub fn require_text(&self, key: &str) -> Result<&str, CoreError> {
        self.get_text(key)
            .ok_or_else(|| CoreError::InvalidData(format!("missing text property '{key}'")))
    }

    pub fn require_record(&self, key: &str) -> Result<&Record, CoreError> {
        self.get_record(key)
            .ok_or_else(|| CoreError::InvalidData(format!("missing record property '{key}'")))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_record_survives_msgpack() {
        let inner = Record::new().with("value", FieldValue::Text("u1".into()));
        let record = Record::new()
            .with("principal", FieldValue::Record(inner))
            .with("owner", FieldValue::Boolean(false))
            .with(
                "elements",
                FieldValue::List(vec![FieldValue::quantity(2.5), FieldValue::Year(2014)]),
            )
            .with(
                "date",
                FieldValue::LocalDate(NaiveDate::from_ymd_opt(2014, 7, 23).unwrap()),
            );

        let bytes = record.to_msgpack().unwrap();
        let restored = Record::from_msgpack(&bytes).unwrap();
        assert_eq!(restored, record);
        assert_eq!(
            restored.get_record("principal").and_then(|r| r.get_text("value")),
            Some("u1")
        );
        assert_eq!(restored.get_list("elements").map(|l| l.len()), Some(2));
    }

    #[test]
    fn quantity_nan_equals_itself() {
        // total_cmp keeps Eq reflexive even for NaN payloads
        let a = FieldValue::quantity(f64::NAN);
        assert_eq!(a, a.clone());
        assert_ne!(FieldValue::quantity(1.0), FieldValue::quantity(2.0));
    }

    #[test]
    fn require_reports_missing_key() {
        let record = Record::new();
        match record.require_text("label") {
            Err(CoreError::InvalidData(msg)) => assert!(msg.contains("label")),
            other => panic!("expected InvalidData, got {other:?}"),
        }
    }
}
