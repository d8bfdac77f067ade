//! Driver boundary.
//!
//! The command builder never talks to the network itself. It drives a
//! [`Session`] obtained from a [`Connector`]; [`crate::postgres`] provides the
//! sqlx-backed implementation, and tests plug in scripted ones.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DriverResult, RowError};
use crate::row::Row;
use crate::statement::Statement;
use crate::value::Value;

/// Consumer of streamed rows. Returning an error aborts the query.
pub type RowSink<'a> = dyn FnMut(Row) -> Result<(), RowError> + Send + 'a;

/// Opens sessions. One session serves exactly one command.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open a new connection.
    async fn open(&self) -> DriverResult<Self::Session>;
}

/// An open connection.
#[async_trait]
pub trait Session: Send {
    /// Apply a per-command timeout; zero disables it.
    async fn set_command_timeout(&mut self, timeout: Duration) -> DriverResult<()>;

    /// Drop per-connection caches that may hold stale type information
    /// (after DDL adding enum/composite types). A session lives for one
    /// command, so caches kept outside the session never carry over.
    async fn reload_types(&mut self) -> DriverResult<()>;

    /// Make a composite type known to the session.
    ///
    /// Called at most once per type name per session.
    async fn map_composite(&mut self, sql_type_name: &str) -> DriverResult<()>;

    /// Prepare a statement server-side.
    async fn prepare(&mut self, statement: &Statement) -> DriverResult<()>;

    /// Execute and discard any rows. Returns the affected row count.
    async fn execute(&mut self, statement: &Statement) -> DriverResult<u64>;

    /// Execute and feed every row of every result set to `sink`, in order.
    ///
    /// Only a statement without parameters can yield more than one result
    /// set.
    async fn query(&mut self, statement: &Statement, sink: &mut RowSink<'_>) -> DriverResult<()>;

    /// First column of the first row; `Value::Null` when there is no row.
    async fn query_scalar(&mut self, statement: &Statement) -> DriverResult<Value>;

    async fn begin(&mut self) -> DriverResult<()>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;

    /// Close the connection.
    async fn close(self) -> DriverResult<()>;
}
