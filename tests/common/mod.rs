//! Scripted in-memory driver for exercising `FluentCommand` without a server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fluent_sql::{
    Connector, DatabaseError, DriverError, DriverResult, ParamValue, Row, RowSink, Session,
    Statement, Value,
};

/// Everything a session was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open,
    SetTimeout(Duration),
    ReloadTypes,
    MapComposite(String),
    Prepare(String),
    Execute(String),
    Query(String),
    QueryScalar(String),
    Begin,
    Commit,
    Rollback,
    Close,
}

/// Scripted reply for one SQL text.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    /// Several result sets, as returned by a multi-statement text.
    ResultSets(Vec<Vec<Row>>),
    Affected(u64),
    Fail(DatabaseError),
    /// One row holding the bound parameters, named after them.
    EchoParams,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    replies: HashMap<String, Reply>,
    opened: usize,
    closed: usize,
    fail_open: bool,
    fail_close: bool,
}

/// Shared handle; clones observe the same state.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<State>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` whenever `sql` runs.
    pub fn on(self, sql: &str, reply: Reply) -> Self {
        self.lock().replies.insert(sql.to_string(), reply);
        self
    }

    pub fn fail_open(self) -> Self {
        self.lock().fail_open = true;
        self
    }

    pub fn fail_close(self) -> Self {
        self.lock().fail_close = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, event: Event) {
        self.lock().events.push(event);
    }

    fn reply(&self, sql: &str) -> Option<Reply> {
        self.lock().replies.get(sql).cloned()
    }
}

#[async_trait]
impl Connector for MockDatabase {
    type Session = MockSession;

    async fn open(&self) -> DriverResult<MockSession> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(DriverError::Connection("connection refused".into()));
        }
        state.opened += 1;
        state.events.push(Event::Open);
        Ok(MockSession { db: self.clone() })
    }
}

pub struct MockSession {
    db: MockDatabase,
}

impl MockSession {
    fn rows_for(&self, statement: &Statement) -> DriverResult<Vec<Row>> {
        match self.db.reply(statement.text()) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::ResultSets(sets)) => Ok(sets.into_iter().flatten().collect()),
            Some(Reply::Fail(err)) => Err(DriverError::Database(err)),
            Some(Reply::EchoParams) => Ok(vec![echo_row(statement)]),
            Some(Reply::Affected(_)) | None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn set_command_timeout(&mut self, timeout: Duration) -> DriverResult<()> {
        self.db.record(Event::SetTimeout(timeout));
        Ok(())
    }

    async fn reload_types(&mut self) -> DriverResult<()> {
        self.db.record(Event::ReloadTypes);
        Ok(())
    }

    async fn map_composite(&mut self, sql_type_name: &str) -> DriverResult<()> {
        self.db.record(Event::MapComposite(sql_type_name.to_string()));
        Ok(())
    }

    async fn prepare(&mut self, statement: &Statement) -> DriverResult<()> {
        self.db.record(Event::Prepare(statement.text().to_string()));
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> DriverResult<u64> {
        self.db.record(Event::Execute(statement.text().to_string()));
        match self.db.reply(statement.text()) {
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Fail(err)) => Err(DriverError::Database(err)),
            Some(Reply::Rows(rows)) => Ok(rows.len() as u64),
            Some(Reply::ResultSets(sets)) => Ok(sets.iter().map(Vec::len).sum::<usize>() as u64),
            Some(Reply::EchoParams) | None => Ok(0),
        }
    }

    async fn query(&mut self, statement: &Statement, sink: &mut RowSink<'_>) -> DriverResult<()> {
        self.db.record(Event::Query(statement.text().to_string()));
        for row in self.rows_for(statement)? {
            sink(row)?;
        }
        Ok(())
    }

    async fn query_scalar(&mut self, statement: &Statement) -> DriverResult<Value> {
        self.db.record(Event::QueryScalar(statement.text().to_string()));
        let rows = self.rows_for(statement)?;
        Ok(rows
            .first()
            .and_then(|row| row.value_at(0).ok().cloned())
            .unwrap_or(Value::Null))
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.db.record(Event::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.db.record(Event::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.db.record(Event::Rollback);
        Ok(())
    }

    async fn close(self) -> DriverResult<()> {
        let mut state = self.db.lock();
        state.closed += 1;
        state.events.push(Event::Close);
        if state.fail_close {
            return Err(DriverError::Connection("connection reset during close".into()));
        }
        Ok(())
    }
}

/// Build rows sharing one column list.
pub fn rows(columns: &[&str], values: Vec<Vec<Value>>) -> Vec<Row> {
    let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
    values
        .into_iter()
        .map(|v| Row::new(columns.clone(), v))
        .collect()
}

fn echo_row(statement: &Statement) -> Row {
    let columns: Arc<[String]> = statement
        .parameters()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    let values = statement
        .parameters()
        .iter()
        .map(|p| param_to_value(p.value()))
        .collect();
    Row::new(columns, values)
}

fn param_to_value(value: &ParamValue) -> Value {
    match value.clone() {
        ParamValue::Text(v) => v.map(Value::Text),
        ParamValue::Integer(v) => v.map(Value::Int4),
        ParamValue::Bigint(v) => v.map(Value::Int8),
        ParamValue::Real(v) => v.map(Value::Float4),
        ParamValue::Boolean(v) => v.map(Value::Bool),
        ParamValue::Timestamp(v) => v.map(Value::Timestamp),
        ParamValue::Bytea(v) => v.map(Value::Bytes),
        ParamValue::TextArray(v) => v.map(Value::TextArray),
        ParamValue::Json(v) => v.map(Value::Json),
        ParamValue::Composite(_) => None,
    }
    .unwrap_or(Value::Null)
}

pub fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(format!(
        "duplicate key value violates unique constraint \"{constraint}\""
    ))
    .with_code("23505")
    .with_constraint(constraint)
}
