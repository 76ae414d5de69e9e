//! Records kept by the query log.

use std::time::Duration;

use serde::Serialize;

use crate::driver::Row;
use crate::param::Parameter;

/// Outcome of the explain pass for one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExplainState {
    /// Not looked at yet.
    #[default]
    Pending,
    /// Not a SELECT; nothing to explain.
    NotApplicable,
    Explained { rows: Vec<Row>, cost: i64 },
}

/// One successfully executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub query: String,
    /// Query with parameter values inlined, pretty-printed when that was enabled.
    pub formatted_query: String,
    pub params: Vec<Parameter>,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    pub explain: ExplainState,
}

impl LogEntry {
    pub fn explain_rows(&self) -> Option<&[Row]> {
        match &self.explain {
            ExplainState::Explained { rows, .. } => Some(rows),
            _ => None,
        }
    }

    pub fn cost(&self) -> Option<i64> {
        match &self.explain {
            ExplainState::Explained { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    /// Whether the explain pass has already visited this entry.
    pub fn is_explained(&self) -> bool {
        !matches!(self.explain, ExplainState::Pending)
    }
}

/// Error code and message reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryError {
    pub code: String,
    pub message: String,
}

/// One failed execution. The trace is always captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub query: String,
    pub formatted_query: String,
    pub params: Vec<Parameter>,
    pub elapsed: Duration,
    pub trace: Vec<String>,
    pub error: QueryError,
}
