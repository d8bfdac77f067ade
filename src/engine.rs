//! Execution engine.
//!
//! One run = one session: open, configure, execute in the shape the caller
//! asked for, close. The stored-procedure path wraps the call and the cursor
//! fetch in a transaction of its own.

use std::collections::HashSet;
use std::time::Duration;

use crate::driver::{Connector, RowSink, Session};
use crate::error::DriverResult;
use crate::param::ParamValue;
use crate::statement::{CommandMode, Statement};
use crate::value::Value;

/// Everything the engine needs from a configured command.
pub(crate) struct Plan {
    pub mode: CommandMode,
    pub statement: Statement,
    pub cursor: String,
    pub timeout: Option<Duration>,
    pub reload_types: bool,
}

/// What the caller wants back.
pub(crate) enum Shape<'s> {
    NonQuery,
    Scalar,
    Rows(&'s mut RowSink<'s>),
}

impl Shape<'_> {
    pub fn expects_rows(&self) -> bool {
        !matches!(self, Shape::NonQuery)
    }
}

pub(crate) enum Outcome {
    Done,
    Scalar(Value),
}

/// Run a plan on a fresh session. The session is closed on every path.
pub(crate) async fn run<C: Connector>(
    connector: &C,
    plan: Plan,
    shape: Shape<'_>,
) -> DriverResult<Outcome> {
    let mut session = connector.open().await?;

    let outcome = match plan.mode {
        CommandMode::StoredProcedure => run_procedure(&mut session, &plan, shape).await,
        CommandMode::Function | CommandMode::Query => run_direct(&mut session, &plan, shape).await,
    };

    let closed = session.close().await;
    match (outcome, closed) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close session after command error");
            Err(err)
        }
    }
}

async fn run_direct<S: Session>(
    session: &mut S,
    plan: &Plan,
    shape: Shape<'_>,
) -> DriverResult<Outcome> {
    configure(session, plan).await?;
    if plan.statement.is_prepared() {
        session.prepare(&plan.statement).await?;
    }
    dispatch(session, &plan.statement, shape).await
}

async fn run_procedure<S: Session>(
    session: &mut S,
    plan: &Plan,
    shape: Shape<'_>,
) -> DriverResult<Outcome> {
    configure(session, plan).await?;

    session.begin().await?;
    tracing::debug!("transaction started for procedure call");

    match call_and_fetch(session, plan, shape).await {
        Ok(outcome) => {
            session.commit().await?;
            tracing::debug!("procedure transaction committed");
            Ok(outcome)
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback after failed procedure call failed");
            }
            Err(err)
        }
    }
}

/// Run the `CALL`, then `FETCH ALL` from its cursor unless no rows are wanted.
async fn call_and_fetch<S: Session>(
    session: &mut S,
    plan: &Plan,
    shape: Shape<'_>,
) -> DriverResult<Outcome> {
    session.execute(&plan.statement).await?;
    if !shape.expects_rows() {
        return Ok(Outcome::Done);
    }
    let fetch = Statement::fetch_all(&plan.cursor);
    dispatch(session, &fetch, shape).await
}

/// Session settings that must be in place before the first statement.
async fn configure<S: Session>(session: &mut S, plan: &Plan) -> DriverResult<()> {
    if let Some(timeout) = plan.timeout {
        session.set_command_timeout(timeout).await?;
    }
    if plan.reload_types {
        session.reload_types().await?;
    }

    let mut mapped = HashSet::new();
    for parameter in plan.statement.parameters() {
        if let ParamValue::Composite(composite) = parameter.value() {
            if mapped.insert(composite.type_name()) {
                session.map_composite(composite.type_name()).await?;
            }
        }
    }
    Ok(())
}

async fn dispatch<S: Session>(
    session: &mut S,
    statement: &Statement,
    shape: Shape<'_>,
) -> DriverResult<Outcome> {
    match shape {
        Shape::NonQuery => {
            let affected = session.execute(statement).await?;
            tracing::debug!(affected_rows = affected, "statement executed");
            Ok(Outcome::Done)
        }
        Shape::Scalar => Ok(Outcome::Scalar(session.query_scalar(statement).await?)),
        Shape::Rows(sink) => {
            session.query(statement, sink).await?;
            Ok(Outcome::Done)
        }
    }
}
