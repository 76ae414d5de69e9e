//! # sea-orm-querylog
//!
//! An in-process query log for SeaORM applications.
//!
//! Statements executed through a [`LoggedConnection`] (or an [`InstrumentedStatement`]
//! over any [`DriverConnection`]) are recorded with their bound parameters, timings,
//! the call site that issued them and, on request, an EXPLAIN based cost estimate.
//! Each execution also gets a `db.query` tracing span, so the log sits alongside
//! your existing tracing setup.
//!
//! ## Features
//!
//! - **Query Log**: Every execution recorded with a readable, parameter-inlined query
//! - **Error Log**: Failed statements kept with their SQLSTATE and message, errors re-raised unchanged
//! - **Call Sites**: Filtered backtraces pointing at the application code that ran the query
//! - **Explain Costs**: Logged SELECTs re-run under EXPLAIN lazily, when the log is read
//! - **Pretty Printing**: Keyword emphasis and line breaks for display in HTML panels
//! - **Totals**: Query count and cumulative time, even when entries are not kept
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sea_orm::Database;
//! use sea_orm_querylog::{QueryLogConfig, QueryLogExt, QueryLogger};
//!
//! let logger = Arc::new(QueryLogger::new(QueryLogConfig::development()));
//! let db = Database::connect("mysql://localhost/mydb").await?.with_query_log(logger.clone());
//!
//! // Use it exactly like a normal DatabaseConnection
//! let users = Users::find().all(&db).await?;
//!
//! // Or prepare statements yourself
//! let mut stmt = db.prepare("select * from users where id = ?");
//! stmt.bind_value(1, 42, ParamType::Int)?;
//! stmt.execute().await?;
//!
//! for entry in logger.query_log().await? {
//!     println!("{:?} {}", entry.elapsed, entry.formatted_query);
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use sea_orm_querylog::{QueryLogConfig, QueryLogger};
//!
//! let config = QueryLogConfig::default()
//!     .with_query_logging(true)      // Keep successful entries (default: false)
//!     .with_debug(true)              // Attach call sites to every entry
//!     .with_backtrace_depth(5)
//!     .with_include_dir("vendor/acme")
//!     .with_slow_query_threshold(Duration::from_millis(100));
//!
//! let logger = QueryLogger::new(config);
//! logger.set_pretty_print(true);
//! ```
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `db.operation` | SQL operation (SELECT, INSERT, UPDATE, DELETE, ...) |
//! | `db.sql.table` | Target table name (when detectable) |
//! | `db.statement` | Full SQL query (when enabled) |
//! | `db.duration_ms` | Execution time in milliseconds |
//! | `slow_query` | Set when the execution exceeded the slow query threshold |
//! | `otel.status_code` | "OK" or "ERROR" |
//! | `error.message` | Error details (on failure) |

mod callsite;
mod config;
mod connection;
mod driver;
mod entry;
mod explain;
mod format;
mod logger;
#[cfg(test)]
mod mock;
mod param;
mod parser;
mod statement;
mod substitute;

pub use callsite::{BacktraceFilter, RawFrame, DEFAULT_MAX_DEPTH};
pub use config::{QueryLogConfig, DEFAULT_EXPLAIN_PREFIX};
pub use connection::{LoggedConnection, QueryLogExt, SeaOrmDriver, SeaOrmStatement};
pub use driver::{error_code, error_message, DriverConnection, DriverStatement, ExecOutcome, Row};
pub use entry::{ErrorEntry, ExplainState, LogEntry, QueryError};
pub use explain::{explain_cost, ExplainEstimator};
pub use format::format_query;
pub use logger::QueryLogger;
pub use param::{ParamKey, ParamType, ParamValue, Parameter, ParameterSet};
pub use parser::{
    extract_sqlstate, extract_table, is_select_statement, parse_operation, ParsedSql, SqlOperation,
};
pub use statement::InstrumentedStatement;
pub use substitute::substitute_parameters;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        InstrumentedStatement, LoggedConnection, ParamType, QueryLogConfig, QueryLogExt,
        QueryLogger,
    };
}
