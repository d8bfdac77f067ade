//! PostgreSQL backend on top of sqlx.
//!
//! Each [`PgSession`] owns one `PgConnection` for the lifetime of a single
//! command. Parameters are bound with their declared wire type so typed
//! NULLs reach the server as such.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgDatabaseError, PgRow,
    PgTypeInfo, Postgres,
};
use sqlx::{
    Arguments, Column, ConnectOptions, Connection, Either, Executor, Row as _, Type, TypeInfo,
};

use crate::driver::{Connector, RowSink, Session};
use crate::error::{DatabaseError, DriverError, DriverResult};
use crate::param::{ParamValue, Parameter};
use crate::row::Row;
use crate::statement::Statement;
use crate::value::Value;

/// Opens one `PgConnection` per command.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PgConnectOptions {
        &self.options
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn open(&self) -> DriverResult<PgSession> {
        let conn = self.options.connect().await.map_err(map_sqlx_error)?;
        tracing::debug!("opened PostgreSQL connection");
        Ok(PgSession {
            conn,
            composites: HashMap::new(),
        })
    }
}

/// OIDs of a composite type and its array type.
#[derive(Debug, Clone, Copy)]
struct CompositeOids {
    oid: Oid,
    array: Oid,
}

/// A live connection serving one command.
pub struct PgSession {
    conn: PgConnection,
    composites: HashMap<String, CompositeOids>,
}

impl PgSession {
    /// Build the argument list, resolving each value's declared type.
    fn arguments(&self, parameters: &[Parameter]) -> DriverResult<PgArguments> {
        let mut args = PgArguments::default();
        for parameter in parameters {
            let bound = BoundParam {
                type_info: self.type_info(parameter.value())?,
                value: parameter.value(),
            };
            // `PgArguments` has a crate-private inherent `add`.
            Arguments::add(&mut args, bound);
        }
        Ok(args)
    }

    /// Declared type of `value`, as the server should see it.
    fn type_info(&self, value: &ParamValue) -> DriverResult<PgTypeInfo> {
        Ok(match value {
            ParamValue::Text(_) => <String as Type<Postgres>>::type_info(),
            ParamValue::Integer(_) => <i32 as Type<Postgres>>::type_info(),
            ParamValue::Bigint(_) => <i64 as Type<Postgres>>::type_info(),
            ParamValue::Real(_) => <f32 as Type<Postgres>>::type_info(),
            ParamValue::Boolean(_) => <bool as Type<Postgres>>::type_info(),
            ParamValue::Timestamp(_) => <NaiveDateTime as Type<Postgres>>::type_info(),
            ParamValue::Bytea(_) => <Vec<u8> as Type<Postgres>>::type_info(),
            ParamValue::TextArray(_) => <Vec<String> as Type<Postgres>>::type_info(),
            ParamValue::Json(_) => PgTypeInfo::with_name("json"),
            ParamValue::Composite(composite) => {
                let oids = self
                    .composites
                    .get(&composite.type_name().to_lowercase())
                    .ok_or_else(|| DriverError::UnknownType(composite.type_name().to_string()))?;
                PgTypeInfo::with_oid(if composite.is_array() { oids.array } else { oids.oid })
            }
        })
    }

    async fn simple(&mut self, sql: &str) -> DriverResult<()> {
        self.conn.execute(sql).await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn set_command_timeout(&mut self, timeout: Duration) -> DriverResult<()> {
        let sql = format!("SET statement_timeout = {}", timeout.as_millis());
        self.simple(&sql).await
    }

    /// Drops this connection's prepared statements and composite OIDs.
    ///
    /// sqlx's own type-OID cache is not touched; it starts empty because
    /// every command runs on a fresh connection.
    async fn reload_types(&mut self) -> DriverResult<()> {
        self.conn
            .clear_cached_statements()
            .await
            .map_err(map_sqlx_error)?;
        self.composites.clear();
        tracing::debug!("statement cache and composite mappings cleared");
        Ok(())
    }

    async fn map_composite(&mut self, sql_type_name: &str) -> DriverResult<()> {
        let key = sql_type_name.to_lowercase();
        if self.composites.contains_key(&key) {
            return Ok(());
        }
        let row: Option<(Oid, Oid)> = sqlx::query_as(
            "SELECT t.oid, t.typarray FROM pg_catalog.pg_type t WHERE t.oid = to_regtype($1)::oid",
        )
        .bind(sql_type_name)
        .fetch_optional(&mut self.conn)
        .await
        .map_err(map_sqlx_error)?;

        let (oid, array) = row.ok_or_else(|| DriverError::UnknownType(sql_type_name.to_string()))?;
        tracing::debug!(type_name = sql_type_name, oid = oid.0, "mapped composite type");
        self.composites.insert(key, CompositeOids { oid, array });
        Ok(())
    }

    async fn prepare(&mut self, statement: &Statement) -> DriverResult<()> {
        let types = statement
            .parameters()
            .iter()
            .map(|p| self.type_info(p.value()))
            .collect::<DriverResult<Vec<_>>>()?;
        (&mut self.conn)
            .prepare_with(statement.text(), &types)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Affected rows, summed over every statement of a simple statement.
    async fn execute(&mut self, statement: &Statement) -> DriverResult<u64> {
        let result = if statement.is_simple() {
            (&mut self.conn)
                .execute(sqlx::raw_sql(statement.text()))
                .await
        } else {
            let args = self.arguments(statement.parameters())?;
            sqlx::query_with(statement.text(), args)
                .persistent(statement.is_prepared())
                .execute(&mut self.conn)
                .await
        };
        Ok(result.map_err(map_sqlx_error)?.rows_affected())
    }

    async fn query(&mut self, statement: &Statement, sink: &mut RowSink<'_>) -> DriverResult<()> {
        if statement.is_simple() {
            let mut stream = sqlx::raw_sql(statement.text()).fetch_many(&mut self.conn);
            while let Some(step) = stream.try_next().await.map_err(map_sqlx_error)? {
                match step {
                    // End of one result set; the next one follows.
                    Either::Left(_) => continue,
                    Either::Right(pg_row) => sink(row_from_pg(&pg_row)?)?,
                }
            }
            return Ok(());
        }

        let args = self.arguments(statement.parameters())?;
        let mut rows = sqlx::query_with(statement.text(), args)
            .persistent(statement.is_prepared())
            .fetch(&mut self.conn);
        while let Some(pg_row) = rows.try_next().await.map_err(map_sqlx_error)? {
            sink(row_from_pg(&pg_row)?)?;
        }
        Ok(())
    }

    async fn query_scalar(&mut self, statement: &Statement) -> DriverResult<Value> {
        let row = if statement.is_simple() {
            (&mut self.conn)
                .fetch_optional(sqlx::raw_sql(statement.text()))
                .await
        } else {
            let args = self.arguments(statement.parameters())?;
            sqlx::query_with(statement.text(), args)
                .persistent(statement.is_prepared())
                .fetch_optional(&mut self.conn)
                .await
        }
        .map_err(map_sqlx_error)?;
        match row {
            Some(row) if !row.is_empty() => decode_column(&row, 0),
            _ => Ok(Value::Null),
        }
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.simple("BEGIN").await
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.simple("ROLLBACK").await
    }

    async fn close(self) -> DriverResult<()> {
        self.conn.close().await.map_err(map_sqlx_error)
    }
}

/// A parameter value paired with the type it is declared as.
#[derive(Debug)]
struct BoundParam<'a> {
    value: &'a ParamValue,
    type_info: PgTypeInfo,
}

// Only consulted when `produces` returns nothing, which never happens here.
impl Type<Postgres> for BoundParam<'_> {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl<'q> Encode<'q, Postgres> for BoundParam<'_> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        match self.value {
            ParamValue::Text(v) => encode_opt(v, buf),
            ParamValue::Integer(v) => encode_opt(v, buf),
            ParamValue::Bigint(v) => encode_opt(v, buf),
            ParamValue::Real(v) => encode_opt(v, buf),
            ParamValue::Boolean(v) => encode_opt(v, buf),
            ParamValue::Timestamp(v) => encode_opt(v, buf),
            ParamValue::Bytea(v) => encode_opt(v, buf),
            ParamValue::TextArray(v) => encode_opt(v, buf),
            // `json` takes the document text as-is.
            ParamValue::Json(Some(doc)) => {
                buf.extend_from_slice(doc.as_bytes());
                IsNull::No
            }
            ParamValue::Json(None) => IsNull::Yes,
            ParamValue::Composite(composite) => composite.encode(buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}

fn encode_opt<T>(value: &Option<T>, buf: &mut PgArgumentBuffer) -> IsNull
where
    T: for<'q> Encode<'q, Postgres>,
{
    match value {
        Some(v) => <T as Encode<'_, Postgres>>::encode_by_ref(v, buf),
        None => IsNull::Yes,
    }
}

fn row_from_pg(row: &PgRow) -> DriverResult<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|i| decode_column(row, i))
        .collect::<DriverResult<Vec<_>>>()?;
    Ok(Row::new(columns.into(), values))
}

/// Decode one column by its reported SQL type.
fn decode_column(row: &PgRow, index: usize) -> DriverResult<Value> {
    let type_name = row.column(index).type_info().name().to_uppercase();

    fn get<'r, T>(row: &'r PgRow, index: usize, wrap: impl FnOnce(T) -> Value) -> DriverResult<Value>
    where
        T: sqlx::Decode<'r, Postgres> + Type<Postgres>,
    {
        let value: Option<T> = row.try_get(index).map_err(map_sqlx_error)?;
        Ok(value.map(wrap).unwrap_or(Value::Null))
    }

    match type_name.as_str() {
        "BOOL" => get::<bool>(row, index, Value::Bool),
        "INT2" => get::<i16>(row, index, Value::Int2),
        "INT4" => get::<i32>(row, index, Value::Int4),
        "INT8" => get::<i64>(row, index, Value::Int8),
        "FLOAT4" => get::<f32>(row, index, Value::Float4),
        "FLOAT8" => get::<f64>(row, index, Value::Float8),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => get::<String>(row, index, Value::Text),
        "BYTEA" => get::<Vec<u8>>(row, index, Value::Bytes),
        "DATE" => get::<NaiveDate>(row, index, Value::Date),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index, Value::Timestamp),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index, Value::TimestampTz),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index, |v| Value::Json(v.to_string())),
        "UUID" => get::<sqlx::types::Uuid>(row, index, |v| Value::Text(v.to_string())),
        "TEXT[]" | "VARCHAR[]" | "_TEXT" | "_VARCHAR" => {
            get::<Vec<String>>(row, index, Value::TextArray)
        }
        _ => {
            let value: Option<String> = row.try_get_unchecked(index).map_err(|e| {
                DriverError::Decode(format!(
                    "column {index} has unsupported type {type_name}; cast it to text ({e})"
                ))
            })?;
            Ok(value.map(Value::Text).unwrap_or(Value::Null))
        }
    }
}

/// Translate a sqlx error into the driver taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> DriverError {
    match err {
        sqlx::Error::Database(db) => {
            let detail = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.detail())
                .map(str::to_string);
            DriverError::Database(DatabaseError {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
                constraint: db.constraint().map(str::to_string),
                detail,
            })
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => DriverError::Decode(err.to_string()),
        other => DriverError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_map_to_connection() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DriverError::Connection(_)));

        let err = map_sqlx_error(sqlx::Error::ColumnNotFound("id".into()));
        assert!(matches!(err, DriverError::Decode(_)));
    }

    #[test]
    fn test_null_params_encode_as_null() {
        let value = ParamValue::Integer(None);
        let bound = BoundParam {
            value: &value,
            type_info: <i32 as Type<Postgres>>::type_info(),
        };
        let mut buf = PgArgumentBuffer::default();
        assert!(matches!(bound.encode_by_ref(&mut buf), IsNull::Yes));
        assert_eq!(bound.produces(), Some(<i32 as Type<Postgres>>::type_info()));
    }

    #[test]
    fn test_json_written_as_text() {
        let value = ParamValue::Json(Some(r#"{"a":1}"#.into()));
        let bound = BoundParam {
            value: &value,
            type_info: PgTypeInfo::with_name("json"),
        };
        let mut buf = PgArgumentBuffer::default();
        assert!(matches!(bound.encode_by_ref(&mut buf), IsNull::No));
        assert_eq!(&buf[..], br#"{"a":1}"#);
    }
}
