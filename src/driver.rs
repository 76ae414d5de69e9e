//! The seam between the query log and the database driver that runs statements.
//!
//! Anything that can prepare a statement, bind values to it, execute it and
//! hand back rows can sit behind these traits. The SeaORM implementation lives
//! in [`crate::connection`].

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::param::{ParamKey, ParamType, ParamValue};
use crate::parser::extract_sqlstate;

/// A result row as column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// What the driver reports after a successful execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
}

/// A prepared statement owned by the driver.
#[async_trait]
pub trait DriverStatement: Send {
    fn sql(&self) -> &str;

    fn bind(
        &mut self,
        key: &ParamKey,
        value: &ParamValue,
        param_type: ParamType,
        length: Option<usize>,
    ) -> Result<(), DbErr>;

    async fn execute(&mut self) -> Result<ExecOutcome, DbErr>;

    /// Rows produced by the last execute. Empty for statements without a result set.
    async fn fetch_all(&mut self) -> Result<Vec<Row>, DbErr>;
}

/// A live connection able to prepare statements.
pub trait DriverConnection: Send + Sync {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DbErr>;
}

/// Code recorded for a failed execution.
///
/// Prefers the SQLSTATE embedded in the driver message and falls back to the
/// kind of `DbErr`.
pub fn error_code(err: &DbErr) -> String {
    if let Some(state) = extract_sqlstate(&err.to_string()) {
        return state;
    }
    let kind = match err {
        DbErr::Conn(_) => "conn",
        DbErr::Exec(_) => "exec",
        DbErr::Query(_) => "query",
        DbErr::Custom(_) => "custom",
        DbErr::RecordNotFound(_) => "record_not_found",
        DbErr::Type(_) => "type",
        DbErr::Json(_) => "json",
        _ => "driver",
    };
    kind.to_string()
}

/// The driver's own message, without SeaORM's `Execution Error:` style prefix.
pub fn error_message(err: &DbErr) -> String {
    match err {
        DbErr::Conn(inner) | DbErr::Exec(inner) | DbErr::Query(inner) => inner.to_string(),
        DbErr::Custom(message) => message.clone(),
        other => other.to_string(),
    }
}
