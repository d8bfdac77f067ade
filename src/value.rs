//! Column values handed back by a driver.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// A single column value as decoded by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Database NULL.
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    /// JSON / JSONB document, kept as text.
    Json(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// `timestamp` (no zone).
    Timestamp(NaiveDateTime),
    /// `timestamptz`, normalized to UTC by the driver.
    TimestampTz(DateTime<Utc>),
    TextArray(Vec<String>),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int2(_) => "smallint",
            Value::Int4(_) => "integer",
            Value::Int8(_) => "bigint",
            Value::Float4(_) => "real",
            Value::Float8(_) => "double precision",
            Value::Text(_) => "text",
            Value::Json(_) => "json",
            Value::Bytes(_) => "bytea",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::TextArray(_) => "text[]",
        }
    }
}

/// Conversion from a non-null [`Value`] into a Rust type.
///
/// Returning `None` means the value has an incompatible type; NULL is
/// handled by the caller before this is reached.
pub trait FromValue: Sized {
    /// Label of the expected SQL type, for error messages.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i16 {
    const EXPECTED: &'static str = "smallint";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int2(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int2(v) => Some(i32::from(*v)),
            Value::Int4(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "bigint";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int2(v) => Some(i64::from(*v)),
            Value::Int4(v) => Some(i64::from(*v)),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    const EXPECTED: &'static str = "real";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float4(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "double precision";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float4(v) => Some(f64::from(*v)),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) | Value::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "bytea";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "text[]";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::TextArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    const EXPECTED: &'static str = "date";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    const EXPECTED: &'static str = "timestamp";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(v) => Some(*v),
            Value::TimestampTz(v) => Some(v.naive_utc()),
            _ => None,
        }
    }
}

// A zone-less timestamp is tagged as UTC as-is, without shifting.
impl FromValue for DateTime<Utc> {
    const EXPECTED: &'static str = "timestamp";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(v) => Some(v.and_utc()),
            Value::TimestampTz(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    const EXPECTED: &'static str = "timestamptz";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampTz(v) => Some(v.fixed_offset()),
            Value::Timestamp(v) => Some(v.and_utc().fixed_offset()),
            _ => None,
        }
    }
}

impl FromValue for serde_json::Value {
    const EXPECTED: &'static str = "json";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Json(v) | Value::Text(v) => serde_json::from_str(v).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(i64::from_value(&Value::Int4(7)), Some(7));
        assert_eq!(i32::from_value(&Value::Int2(-3)), Some(-3));
        assert_eq!(i32::from_value(&Value::Int8(1)), None);
    }

    #[test]
    fn test_timestamp_is_tagged_utc_without_shift() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let utc = DateTime::<Utc>::from_value(&Value::Timestamp(naive)).unwrap();
        assert_eq!(utc.naive_utc(), naive);
    }

    #[test]
    fn test_json_parses_documents() {
        let doc = serde_json::Value::from_value(&Value::Json(r#"{"a":1}"#.into())).unwrap();
        assert_eq!(doc["a"], 1);
        assert_eq!(Value::Json("{}".into()).type_name(), "json");
    }
}
