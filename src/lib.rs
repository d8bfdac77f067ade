//! # fluent-sql
//!
//! A fluent command builder and executor for PostgreSQL.
//!
//! One API covers three kinds of call:
//!
//! | Mode              | Builder call                        | Runs as                              |
//! |-------------------|-------------------------------------|--------------------------------------|
//! | Query             | `as_query(sql)`                     | the SQL text                         |
//! | Function          | `as_function(name)`                 | `SELECT * FROM name(arg => $1, ...)` |
//! | Stored procedure  | `as_stored_procedure(call, cursor)` | `CALL` + `FETCH ALL IN "cursor"` in one transaction |
//!
//! Each command opens one connection, runs once and closes the connection
//! on every path. Constraint violations can be swapped for caller-chosen
//! errors.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use fluent_sql::prelude::*;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("email already registered")]
//! struct DuplicateEmail;
//!
//! FluentCommand::new("postgres://localhost/app")?
//!     .as_query("insert into users (email) values (@email)")
//!     .add_param("email", "ada@example.com")
//!     .on_constraint_violation("uq_users_email", DuplicateEmail)?
//!     .exec_non_query_async()
//!     .await?;
//!
//! let count: i64 = FluentCommand::new("postgres://localhost/app")?
//!     .as_query("select count(*) from users")
//!     .exec_scalar_async()
//!     .await?;
//! ```
//!
//! Every `exec_*_async` method has a blocking twin without the suffix. The
//! blocking variants must not be called from inside an async runtime.

pub mod command;
pub mod config;
pub mod connection_string;
pub mod driver;
mod engine;
pub mod error;
pub mod param;
pub mod postgres;
pub mod row;
pub mod statement;
pub mod value;

pub use command::{FluentCommand, MAX_COMMAND_TIMEOUT_SECS};
pub use config::DatabaseConfig;
pub use connection_string::create_connection_options;
pub use driver::{Connector, RowSink, Session};
pub use error::{CommandError, CommandResult, DatabaseError, DriverError, DriverResult, RowError};
pub use param::{CompositeValue, EncodeComposite, ParamValue, Parameter, WireType};
pub use postgres::{PgConnector, PgSession};
pub use row::Row;
pub use statement::{CommandMode, Statement};
pub use value::{FromValue, Value};

pub mod prelude {
    pub use crate::command::FluentCommand;
    pub use crate::config::DatabaseConfig;
    pub use crate::error::{CommandError, CommandResult, RowError};
    pub use crate::row::Row;
    pub use crate::value::{FromValue, Value};
}
