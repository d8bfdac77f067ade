//! Fluent command builder.
//!
//! A [`FluentCommand`] describes exactly one database call. Configuration
//! methods consume and return the builder; every `exec_*` method consumes
//! it, opens one connection, runs the command and closes the connection
//! before returning.
//!
//! ```rust,ignore
//! use fluent_sql::FluentCommand;
//!
//! let users = FluentCommand::new("postgres://localhost/app")?
//!     .as_stored_procedure("call get_active_users(@min_age, 'cur1')", "cur1")
//!     .add_param("min_age", 18)
//!     .exec_read_list_async(|row| Ok((row.get_i32("id")?, row.get_string("email")?)))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::connection_string::create_connection_options;
use crate::driver::Connector;
use crate::engine::{self, Outcome, Plan, Shape};
use crate::error::{CommandError, CommandResult, DriverError, RowError};
use crate::param::{CompositeValue, EncodeComposite, ParamValue, Parameter};
use crate::postgres::PgConnector;
use crate::row::Row;
use crate::statement::{CommandMode, Statement};
use crate::value::{FromValue, Value};

type RegisteredError = Box<dyn std::error::Error + Send + Sync>;

/// Largest timeout the server accepts: `statement_timeout` is an `int4`
/// count of milliseconds.
pub const MAX_COMMAND_TIMEOUT_SECS: u32 = (i32::MAX / 1000) as u32;

pub(crate) fn check_timeout(seconds: i64) -> CommandResult<u32> {
    u32::try_from(seconds)
        .ok()
        .filter(|s| *s <= MAX_COMMAND_TIMEOUT_SECS)
        .ok_or_else(|| {
            CommandError::config(format!(
                "command timeout must be between 0 and {MAX_COMMAND_TIMEOUT_SECS} seconds, got {seconds}"
            ))
        })
}

/// Builder and executor for a single database command.
pub struct FluentCommand<C: Connector = PgConnector> {
    connector: C,
    mode: Option<CommandMode>,
    text: String,
    parameters: Vec<Parameter>,
    timeout: Option<u32>,
    needs_preparation: bool,
    needs_type_reload: bool,
    ref_cursor: String,
    constraint_errors: HashMap<String, RegisteredError>,
    misconfiguration: Option<String>,
}

impl FluentCommand<PgConnector> {
    /// Create a command for a PostgreSQL connection URL.
    ///
    /// Nothing is opened until an `exec_*` method runs.
    pub fn new(connection_string: &str) -> CommandResult<Self> {
        let options = create_connection_options(connection_string)?;
        Ok(Self::with_connector(PgConnector::new(options)))
    }

    /// Create a command from loaded settings, applying their default timeout.
    pub fn from_config(config: &DatabaseConfig) -> CommandResult<Self> {
        let mut command = Self::with_connector(PgConnector::new(config.connect_options()?));
        command.timeout = config
            .command_timeout
            .map(|seconds| check_timeout(i64::from(seconds)))
            .transpose()?;
        Ok(command)
    }
}

impl<C: Connector> FluentCommand<C> {
    /// Create a command that opens its session through `connector`.
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            mode: None,
            text: String::new(),
            parameters: Vec::new(),
            timeout: None,
            needs_preparation: true,
            needs_type_reload: false,
            ref_cursor: String::new(),
            constraint_errors: HashMap::new(),
            misconfiguration: None,
        }
    }

    /// Call a stored function by name: `SELECT * FROM name(...)` with the
    /// bound parameters as arguments.
    pub fn as_function(self, name: &str) -> Self {
        self.set_mode(CommandMode::Function, name)
    }

    /// Raw SQL text.
    pub fn as_query(self, text: &str) -> Self {
        self.set_mode(CommandMode::Query, text)
    }

    /// Call a stored procedure, e.g. `call get_users($1, 'cur1')`.
    ///
    /// If the procedure returns rows through a ref cursor, `ref_cursor` names
    /// it; the rows are fetched inside the same transaction. Preparation is
    /// disabled for this mode.
    pub fn as_stored_procedure(self, call: &str, ref_cursor: &str) -> Self {
        let mut command = self.set_mode(CommandMode::StoredProcedure, call);
        command.ref_cursor = ref_cursor.to_string();
        command.needs_preparation = false;
        command
    }

    fn set_mode(mut self, mode: CommandMode, text: &str) -> Self {
        if let Some(previous) = self.mode {
            self.misconfiguration.get_or_insert_with(|| {
                format!("command mode already set to {previous:?}, cannot switch to {mode:?}")
            });
        }
        self.mode = Some(mode);
        self.text = text.to_string();
        self
    }

    /// Command timeout in seconds. Zero means no timeout.
    ///
    /// Accepts `0..=MAX_COMMAND_TIMEOUT_SECS`.
    pub fn with_timeout(mut self, seconds: i32) -> CommandResult<Self> {
        self.timeout = Some(check_timeout(i64::from(seconds))?);
        Ok(self)
    }

    /// Skip server-side preparation.
    pub fn without_preparation(mut self) -> Self {
        self.needs_preparation = false;
        self
    }

    /// Refresh the connection's type metadata before executing.
    pub fn with_type_reload(mut self) -> Self {
        self.needs_type_reload = true;
        self
    }

    /// Return `error` instead of the engine error when `constraint` is
    /// violated. Names compare case-insensitively; registering the same name
    /// twice is an error.
    pub fn on_constraint_violation<E>(mut self, constraint: &str, error: E) -> CommandResult<Self>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.constraint_errors.entry(constraint.to_lowercase()) {
            Entry::Occupied(_) => Err(CommandError::config(format!(
                "constraint '{constraint}' is already registered"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(error));
                Ok(self)
            }
        }
    }

    /// Bind a typed parameter.
    ///
    /// Accepts text, `i32`, `i64`, `f32`, `bool`, timestamps, bytes and text
    /// lists, each also as `Option`: `None` binds a NULL of the same type.
    pub fn add_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.push(Parameter::new(name, value.into()));
        self
    }

    /// Bind JSON text with the `json` wire type.
    pub fn add_json_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.parameters.push(Parameter::new(
            name,
            ParamValue::Json(value.map(str::to_string)),
        ));
        self
    }

    /// Bind a record value as the composite type `sql_type_name`.
    ///
    /// The type is mapped on the connection once before execution.
    pub fn add_composite_param<T>(mut self, name: &str, value: T, sql_type_name: &str) -> Self
    where
        T: EncodeComposite + 'static,
    {
        let composite = CompositeValue::new(sql_type_name, false, Arc::new(value));
        self.parameters
            .push(Parameter::new(name, ParamValue::Composite(composite)));
        self
    }

    /// Bind an array of record values as `sql_type_name[]`.
    pub fn add_composite_param_collection<T>(
        mut self,
        name: &str,
        values: Vec<T>,
        sql_type_name: &str,
    ) -> Self
    where
        Vec<T>: EncodeComposite + 'static,
    {
        let composite = CompositeValue::new(sql_type_name, true, Arc::new(values));
        self.parameters
            .push(Parameter::new(name, ParamValue::Composite(composite)));
        self
    }

    pub fn mode(&self) -> Option<CommandMode> {
        self.mode
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    pub fn needs_preparation(&self) -> bool {
        self.needs_preparation
    }

    // Suspending entry points.

    /// Execute and discard any rows.
    pub async fn exec_non_query_async(self) -> CommandResult<()> {
        self.execute(Shape::NonQuery).await.map(|_| ())
    }

    /// First column of the first row. NULL (or no row) yields `T::default()`.
    pub async fn exec_scalar_async<T>(self) -> CommandResult<T>
    where
        T: FromValue + Default,
    {
        let value = match self.execute(Shape::Scalar).await? {
            Outcome::Scalar(value) => value,
            Outcome::Done => Value::Null,
        };
        scalar_from_value(&value)
    }

    /// Run `item_builder` on every row and keep the value built from the
    /// last one. `None` when no row was read.
    pub async fn exec_read_async<T, F>(self, mut item_builder: F) -> CommandResult<Option<T>>
    where
        F: FnMut(&Row) -> Result<T, RowError> + Send,
        T: Send,
    {
        let mut last = None;
        let mut sink = |row: Row| -> Result<(), RowError> {
            last = Some(item_builder(&row)?);
            Ok(())
        };
        self.execute(Shape::Rows(&mut sink)).await?;
        Ok(last)
    }

    /// Run `item_builder` on every row, collecting in result order.
    pub async fn exec_read_list_async<T, F>(self, mut item_builder: F) -> CommandResult<Vec<T>>
    where
        F: FnMut(&Row) -> Result<T, RowError> + Send,
        T: Send,
    {
        let mut items = Vec::new();
        let mut sink = |row: Row| -> Result<(), RowError> {
            items.push(item_builder(&row)?);
            Ok(())
        };
        self.execute(Shape::Rows(&mut sink)).await?;
        Ok(items)
    }

    // Blocking entry points. Each drives the async path on a private
    // current-thread runtime.

    pub fn exec_non_query(self) -> CommandResult<()> {
        block_on(self.exec_non_query_async())?
    }

    pub fn exec_scalar<T>(self) -> CommandResult<T>
    where
        T: FromValue + Default,
    {
        block_on(self.exec_scalar_async())?
    }

    pub fn exec_read<T, F>(self, item_builder: F) -> CommandResult<Option<T>>
    where
        F: FnMut(&Row) -> Result<T, RowError> + Send,
        T: Send,
    {
        block_on(self.exec_read_async(item_builder))?
    }

    pub fn exec_read_list<T, F>(self, item_builder: F) -> CommandResult<Vec<T>>
    where
        F: FnMut(&Row) -> Result<T, RowError> + Send,
        T: Send,
    {
        block_on(self.exec_read_list_async(item_builder))?
    }

    /// Validate, run, and remap the failure once at this boundary.
    async fn execute(self, shape: Shape<'_>) -> CommandResult<Outcome> {
        let Self {
            connector,
            mode,
            text,
            parameters,
            timeout,
            needs_preparation,
            needs_type_reload,
            ref_cursor,
            mut constraint_errors,
            misconfiguration,
        } = self;

        if let Some(message) = misconfiguration {
            return Err(CommandError::InvalidConfiguration(message));
        }
        let mode = mode.ok_or_else(|| {
            CommandError::config("no command mode set; call as_function, as_query or as_stored_procedure first")
        })?;
        if mode == CommandMode::StoredProcedure && shape.expects_rows() && ref_cursor.trim().is_empty() {
            return Err(CommandError::config(
                "stored procedure returning rows needs a ref cursor name",
            ));
        }

        let prepared = needs_preparation && mode != CommandMode::StoredProcedure;
        let statement = Statement::for_mode(mode, &text, parameters, prepared);
        tracing::debug!(
            mode = ?mode,
            prepared,
            sql_preview = %statement.text().chars().take(100).collect::<String>(),
            "executing command"
        );

        let plan = Plan {
            mode,
            statement,
            cursor: ref_cursor,
            timeout: timeout.map(|s| Duration::from_secs(u64::from(s))),
            reload_types: needs_type_reload,
        };
        engine::run(&connector, plan, shape)
            .await
            .map_err(|err| remap(err, &mut constraint_errors))
    }
}

/// Swap a registered constraint's error in for the engine error.
fn remap(err: DriverError, registered: &mut HashMap<String, RegisteredError>) -> CommandError {
    match err {
        DriverError::Database(db) => {
            let replacement = db
                .constraint
                .as_deref()
                .map(str::to_lowercase)
                .and_then(|key| registered.remove(&key));
            match replacement {
                Some(source) => CommandError::ConstraintViolation {
                    constraint: db.constraint.unwrap_or_default(),
                    source,
                },
                None => CommandError::CommandExecutionFailed(db),
            }
        }
        DriverError::Row(row_err) => CommandError::Row(row_err),
        other => CommandError::Driver(other),
    }
}

fn scalar_from_value<T: FromValue + Default>(value: &Value) -> CommandResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::from_value(value).ok_or_else(|| {
        CommandError::Row(RowError::TypeMismatch {
            column: "?column?".to_string(),
            expected: T::EXPECTED,
            found: value.type_name(),
        })
    })
}

fn block_on<F: Future>(future: F) -> CommandResult<F::Output> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(CommandError::BlockingInRuntime);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CommandError::Driver(DriverError::Connection(format!("failed to start runtime: {e}"))))?;
    Ok(runtime.block_on(future))
}
