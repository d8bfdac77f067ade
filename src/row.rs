//! Row accessor.
//!
//! Typed, null-aware extraction of column values by name. Item builders
//! passed to `exec_read` / `exec_read_list` receive a [`Row`]:
//!
//! ```
//! use fluent_sql::{Row, RowError, Value};
//! use std::sync::Arc;
//!
//! struct User {
//!     id: i32,
//!     email: Option<String>,
//! }
//!
//! fn build(row: &Row) -> Result<User, RowError> {
//!     Ok(User {
//!         id: row.get_i32("id")?,
//!         email: row.get_string("email")?,
//!     })
//! }
//!
//! let columns: Arc<[String]> = Arc::from(vec!["id".to_string(), "email".to_string()]);
//! let row = Row::new(columns, vec![Value::Int4(7), Value::Null]);
//! let user = build(&row).unwrap();
//! assert_eq!(user.id, 7);
//! assert!(user.email.is_none());
//! ```

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::RowError;
use crate::value::{FromValue, Value};

/// One row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. Column names are shared between rows of one result set.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve a column name to its ordinal.
    ///
    /// An exact match wins; otherwise the first ASCII case-insensitive match.
    pub fn ordinal(&self, name: &str) -> Result<usize, RowError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
            .ok_or_else(|| RowError::ColumnNotFound(name.to_string()))
    }

    /// Raw value at an ordinal.
    pub fn value_at(&self, ordinal: usize) -> Result<&Value, RowError> {
        self.values.get(ordinal).ok_or(RowError::OrdinalOutOfRange {
            ordinal,
            len: self.values.len(),
        })
    }

    /// Raw value by column name.
    pub fn value(&self, name: &str) -> Result<&Value, RowError> {
        self.value_at(self.ordinal(name)?)
    }

    /// Check if a column is NULL.
    pub fn is_null(&self, name: &str) -> Result<bool, RowError> {
        Ok(self.value(name)?.is_null())
    }

    /// Typed value at an ordinal; NULL is an error.
    pub fn get_at<T: FromValue>(&self, ordinal: usize) -> Result<T, RowError> {
        self.get_opt_at(ordinal)?
            .ok_or_else(|| RowError::UnexpectedNull(self.column_label(ordinal)))
    }

    /// Typed value at an ordinal; NULL yields `None`.
    pub fn get_opt_at<T: FromValue>(&self, ordinal: usize) -> Result<Option<T>, RowError> {
        let value = self.value_at(ordinal)?;
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value)
            .map(Some)
            .ok_or_else(|| RowError::TypeMismatch {
                column: self.column_label(ordinal),
                expected: T::EXPECTED,
                found: value.type_name(),
            })
    }

    /// Typed value by column name; NULL is an error.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, RowError> {
        self.get_at(self.ordinal(name)?)
    }

    /// Typed value by column name; NULL yields `None`.
    pub fn get_opt<T: FromValue>(&self, name: &str) -> Result<Option<T>, RowError> {
        self.get_opt_at(self.ordinal(name)?)
    }

    pub fn get_i32(&self, name: &str) -> Result<i32, RowError> {
        self.get(name)
    }

    pub fn get_i32_opt(&self, name: &str) -> Result<Option<i32>, RowError> {
        self.get_opt(name)
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, RowError> {
        self.get(name)
    }

    pub fn get_i64_opt(&self, name: &str) -> Result<Option<i64>, RowError> {
        self.get_opt(name)
    }

    pub fn get_f64(&self, name: &str) -> Result<f64, RowError> {
        self.get(name)
    }

    pub fn get_f64_opt(&self, name: &str) -> Result<Option<f64>, RowError> {
        self.get_opt(name)
    }

    pub fn get_f32(&self, name: &str) -> Result<f32, RowError> {
        self.get(name)
    }

    pub fn get_f32_opt(&self, name: &str) -> Result<Option<f32>, RowError> {
        self.get_opt(name)
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, RowError> {
        self.get(name)
    }

    pub fn get_bool_opt(&self, name: &str) -> Result<Option<bool>, RowError> {
        self.get_opt(name)
    }

    /// Text column; NULL yields `None` rather than an error.
    pub fn get_string(&self, name: &str) -> Result<Option<String>, RowError> {
        self.get_opt(name)
    }

    pub fn get_datetime(&self, name: &str) -> Result<NaiveDateTime, RowError> {
        self.get(name)
    }

    pub fn get_datetime_opt(&self, name: &str) -> Result<Option<NaiveDateTime>, RowError> {
        self.get_opt(name)
    }

    /// Timestamp tagged as UTC, whatever the column's own zone handling.
    pub fn get_datetime_utc(&self, name: &str) -> Result<DateTime<Utc>, RowError> {
        self.get(name)
    }

    pub fn get_datetime_utc_opt(&self, name: &str) -> Result<Option<DateTime<Utc>>, RowError> {
        self.get_opt(name)
    }

    pub fn get_datetime_offset(&self, name: &str) -> Result<DateTime<FixedOffset>, RowError> {
        self.get(name)
    }

    pub fn get_datetime_offset_opt(
        &self,
        name: &str,
    ) -> Result<Option<DateTime<FixedOffset>>, RowError> {
        self.get_opt(name)
    }

    /// Text array, copied into an owned list.
    pub fn get_string_list(&self, name: &str) -> Result<Vec<String>, RowError> {
        self.get(name)
    }

    pub fn get_bytes(&self, name: &str) -> Result<Vec<u8>, RowError> {
        self.get(name)
    }

    /// JSON column parsed into a document.
    pub fn get_json(&self, name: &str) -> Result<serde_json::Value, RowError> {
        self.get(name)
    }

    pub fn get_json_opt(&self, name: &str) -> Result<Option<serde_json::Value>, RowError> {
        self.get_opt(name)
    }

    fn column_label(&self, ordinal: usize) -> String {
        self.columns
            .get(ordinal)
            .cloned()
            .unwrap_or_else(|| format!("#{ordinal}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(pairs: Vec<(&str, Value)>) -> Row {
        let (names, values): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .unzip();
        Row::new(Arc::from(names), values)
    }

    #[test]
    fn test_missing_column_fails_loudly() {
        let r = row(vec![("id", Value::Int4(1))]);
        assert_eq!(
            r.get_i32("user_id"),
            Err(RowError::ColumnNotFound("user_id".into()))
        );
    }

    #[test]
    fn test_ordinal_prefers_exact_match() {
        let r = row(vec![("Name", Value::Int4(1)), ("name", Value::Int4(2))]);
        assert_eq!(r.ordinal("name"), Ok(1));
        assert_eq!(r.ordinal("NAME"), Ok(0));
    }

    #[test]
    fn test_null_variants() {
        let r = row(vec![("age", Value::Null), ("nick", Value::Null)]);
        assert_eq!(r.get_i32_opt("age"), Ok(None));
        assert_eq!(r.get_string("nick"), Ok(None));
        assert_eq!(r.get_i32("age"), Err(RowError::UnexpectedNull("age".into())));
        assert_eq!(r.is_null("age"), Ok(true));
    }

    #[test]
    fn test_type_mismatch() {
        let r = row(vec![("id", Value::Text("x".into()))]);
        assert_eq!(
            r.get_i64("id"),
            Err(RowError::TypeMismatch {
                column: "id".into(),
                expected: "bigint",
                found: "text",
            })
        );
    }

    #[test]
    fn test_utc_normalization() {
        let naive = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let r = row(vec![
            ("plain", Value::Timestamp(naive)),
            ("zoned", Value::TimestampTz(naive.and_utc())),
        ]);
        assert_eq!(r.get_datetime_utc("plain").unwrap(), naive.and_utc());
        assert_eq!(r.get_datetime_utc("zoned").unwrap(), naive.and_utc());
        assert_eq!(r.get_datetime("zoned").unwrap(), naive);
        assert_eq!(r.get_datetime_offset("zoned").unwrap().offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_arrays_are_owned() {
        let r = row(vec![
            ("tags", Value::TextArray(vec!["a".into(), "b".into()])),
            ("blob", Value::Bytes(vec![1, 2, 3])),
        ]);
        assert_eq!(r.get_string_list("tags").unwrap(), vec!["a", "b"]);
        assert_eq!(r.get_bytes("blob").unwrap(), vec![1, 2, 3]);
    }
}
