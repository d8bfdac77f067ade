//! Typed command parameters.
//!
//! Every bound value carries its wire type, including NULLs: the server
//! needs the declared type to interpret an untyped NULL. The `From`
//! conversions below are the typed overloads accepted by
//! [`FluentCommand::add_param`](crate::FluentCommand::add_param).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgArgumentBuffer, Postgres};

/// Declared wire type of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Text,
    Integer,
    Bigint,
    Real,
    Boolean,
    Timestamp,
    Bytea,
    TextArray,
    Json,
    /// A structural type registered on the connection under `type_name`.
    Composite { type_name: String, array: bool },
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Text => f.write_str("text"),
            WireType::Integer => f.write_str("integer"),
            WireType::Bigint => f.write_str("bigint"),
            WireType::Real => f.write_str("real"),
            WireType::Boolean => f.write_str("boolean"),
            WireType::Timestamp => f.write_str("timestamp"),
            WireType::Bytea => f.write_str("bytea"),
            WireType::TextArray => f.write_str("text[]"),
            WireType::Json => f.write_str("json"),
            WireType::Composite { type_name, array: false } => f.write_str(type_name),
            WireType::Composite { type_name, array: true } => write!(f, "{type_name}[]"),
        }
    }
}

/// Encoder for a record-like value bound as a composite parameter.
///
/// Implemented for every type sqlx can encode for Postgres, which covers
/// `#[derive(sqlx::Type)]` structs and `Vec`s of them.
pub trait EncodeComposite: Send + Sync + fmt::Debug {
    fn encode_composite(&self, buf: &mut PgArgumentBuffer) -> IsNull;
}

impl<T> EncodeComposite for T
where
    T: for<'q> Encode<'q, Postgres> + Send + Sync + fmt::Debug,
{
    fn encode_composite(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        <T as Encode<'_, Postgres>>::encode_by_ref(self, buf)
    }
}

/// A composite value together with the SQL type it maps to.
#[derive(Debug, Clone)]
pub struct CompositeValue {
    type_name: String,
    array: bool,
    value: Arc<dyn EncodeComposite>,
}

impl CompositeValue {
    pub(crate) fn new(type_name: &str, array: bool, value: Arc<dyn EncodeComposite>) -> Self {
        Self {
            type_name: type_name.to_string(),
            array,
            value,
        }
    }

    /// SQL type name the value is mapped to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the value is an array of the composite type.
    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn encode(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        self.value.encode_composite(buf)
    }
}

/// A parameter value. `None` payloads are typed NULLs.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Text(Option<String>),
    Integer(Option<i32>),
    Bigint(Option<i64>),
    Real(Option<f32>),
    Boolean(Option<bool>),
    Timestamp(Option<NaiveDateTime>),
    Bytea(Option<Vec<u8>>),
    TextArray(Option<Vec<String>>),
    Json(Option<String>),
    Composite(CompositeValue),
}

impl ParamValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            ParamValue::Text(_) => WireType::Text,
            ParamValue::Integer(_) => WireType::Integer,
            ParamValue::Bigint(_) => WireType::Bigint,
            ParamValue::Real(_) => WireType::Real,
            ParamValue::Boolean(_) => WireType::Boolean,
            ParamValue::Timestamp(_) => WireType::Timestamp,
            ParamValue::Bytea(_) => WireType::Bytea,
            ParamValue::TextArray(_) => WireType::TextArray,
            ParamValue::Json(_) => WireType::Json,
            ParamValue::Composite(c) => WireType::Composite {
                type_name: c.type_name.clone(),
                array: c.array,
            },
        }
    }

    /// Whether this is an explicit typed NULL.
    ///
    /// Composite values are opaque here and never report NULL.
    pub fn is_null(&self) -> bool {
        match self {
            ParamValue::Text(v) | ParamValue::Json(v) => v.is_none(),
            ParamValue::Integer(v) => v.is_none(),
            ParamValue::Bigint(v) => v.is_none(),
            ParamValue::Real(v) => v.is_none(),
            ParamValue::Boolean(v) => v.is_none(),
            ParamValue::Timestamp(v) => v.is_none(),
            ParamValue::Bytea(v) => v.is_none(),
            ParamValue::TextArray(v) => v.is_none(),
            ParamValue::Composite(_) => false,
        }
    }
}

/// A named, typed parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: ParamValue,
}

impl Parameter {
    /// Create a parameter. A leading `@` or `:` on the name is dropped.
    pub fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.trim_start_matches(['@', ':']).to_string(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }
}

// Each host type maps to one variant, both as a value and as a typed NULL.
macro_rules! impl_param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::$variant(Some(v.into()))
                }
            }

            impl From<Option<$ty>> for ParamValue {
                fn from(v: Option<$ty>) -> Self {
                    ParamValue::$variant(v.map(Into::into))
                }
            }
        )*
    };
}

impl_param_from! {
    String => Text,
    &str => Text,
    i32 => Integer,
    i64 => Bigint,
    f32 => Real,
    bool => Boolean,
    NaiveDateTime => Timestamp,
    Vec<u8> => Bytea,
    &[u8] => Bytea,
    Vec<String> => TextArray,
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(v: DateTime<Utc>) -> Self {
        ParamValue::Timestamp(Some(v.naive_utc()))
    }
}

impl From<Option<DateTime<Utc>>> for ParamValue {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        ParamValue::Timestamp(v.map(|d| d.naive_utc()))
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(v: Vec<&str>) -> Self {
        ParamValue::TextArray(Some(v.into_iter().map(str::to_string).collect()))
    }
}

impl From<&[&str]> for ParamValue {
    fn from(v: &[&str]) -> Self {
        ParamValue::TextArray(Some(v.iter().map(|s| s.to_string()).collect()))
    }
}

impl From<Option<&[&str]>> for ParamValue {
    fn from(v: Option<&[&str]>) -> Self {
        ParamValue::TextArray(v.map(|s| s.iter().map(|s| s.to_string()).collect()))
    }
}
