use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A single typed scalar carried by an [`crate::Event`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// Serializes to its bare scalar, not an externally-tagged enum, so a
/// published event reads as plain JSON fields (`"status": 200`) rather
/// than `{"status": {"Int64": 200}}`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int8(v) => serializer.serialize_i8(*v),
            Value::Int16(v) => serializer.serialize_i16(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::Uint8(v) => serializer.serialize_u8(*v),
            Value::Uint16(v) => serializer.serialize_u16(*v),
            Value::Uint32(v) => serializer.serialize_u32(*v),
            Value::Uint64(v) => serializer.serialize_u64(*v),
            Value::Float32(v) => serializer.serialize_f32(*v),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Timestamp(v) => serializer.serialize_str(&v.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_a_bare_scalar() {
        assert_eq!(serde_json::to_string(&Value::Uint16(2817)).unwrap(), "2817");
        assert_eq!(
            serde_json::to_string(&Value::String("x".to_string())).unwrap(),
            "\"x\""
        );
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
    }
}
