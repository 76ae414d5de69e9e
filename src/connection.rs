//! SeaORM as the statement driver, and a connection wrapper that logs.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, FromQueryResult,
    QueryResult, Statement, Value,
};
use serde_json::Value as JsonValue;
use tracing::Instrument;

use crate::driver::{DriverConnection, DriverStatement, ExecOutcome, Row};
use crate::logger::QueryLogger;
use crate::param::{ParamKey, ParamType, ParamValue, Parameter};
use crate::parser::{in_ranges, parse_operation, quoted_ranges};
use crate::statement::{query_span, report, InstrumentedStatement};

static NAMED_PARAM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":[A-Za-z_][A-Za-z0-9_]*").unwrap());

/// A shared SeaORM connection used as a statement driver, for example by the
/// explain pass.
#[derive(Debug, Clone)]
pub struct SeaOrmDriver {
    conn: Arc<DatabaseConnection>,
}

impl SeaOrmDriver {
    pub fn new(conn: Arc<DatabaseConnection>) -> Self {
        Self { conn }
    }
}

impl From<DatabaseConnection> for SeaOrmDriver {
    fn from(conn: DatabaseConnection) -> Self {
        Self::new(Arc::new(conn))
    }
}

impl DriverConnection for SeaOrmDriver {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DbErr> {
        Ok(Box::new(SeaOrmStatement::new(self.conn.clone(), sql)))
    }
}

/// A statement prepared against a SeaORM connection.
///
/// Values are buffered until execute. Named `:name` placeholders are rewritten
/// to the backend's positional form, since SeaORM only binds by position.
#[derive(Debug)]
pub struct SeaOrmStatement {
    conn: Arc<DatabaseConnection>,
    sql: String,
    bindings: Vec<(ParamKey, Value)>,
    rows: Vec<Row>,
}

impl SeaOrmStatement {
    pub fn new(conn: Arc<DatabaseConnection>, sql: impl Into<String>) -> Self {
        Self {
            conn,
            sql: sql.into(),
            bindings: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn build(&self) -> Result<Statement, DbErr> {
        let backend = self.conn.get_database_backend();
        let has_named = self.bindings.iter().any(|(key, _)| !key.is_position());
        if !has_named {
            let mut ordinal: Vec<&(ParamKey, Value)> = self.bindings.iter().collect();
            ordinal.sort_by(|a, b| a.0.cmp(&b.0));
            let values = ordinal.into_iter().map(|(_, value)| value.clone());
            return Ok(Statement::from_sql_and_values(backend, &self.sql, values));
        }
        if self.bindings.iter().any(|(key, _)| key.is_position()) {
            return Err(DbErr::Custom(
                "cannot mix named and positional parameters in one statement".to_string(),
            ));
        }

        let literals = quoted_ranges(&self.sql);
        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::new();
        let mut last = 0;
        for m in NAMED_PARAM_REGEX.find_iter(&self.sql) {
            // `::type` casts
            if self.sql[..m.start()].ends_with(':') || in_ranges(&literals, m.start()) {
                continue;
            }
            let value = self
                .bindings
                .iter()
                .find(|(key, _)| key.token().as_deref() == Some(m.as_str()))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| DbErr::Custom(format!("no value bound for {}", m.as_str())))?;
            values.push(value);

            sql.push_str(&self.sql[last..m.start()]);
            match backend {
                DbBackend::Postgres => sql.push_str(&format!("${}", values.len())),
                _ => sql.push('?'),
            }
            last = m.end();
        }
        sql.push_str(&self.sql[last..]);

        Ok(Statement::from_sql_and_values(backend, sql, values))
    }
}

#[async_trait]
impl DriverStatement for SeaOrmStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        key: &ParamKey,
        value: &ParamValue,
        param_type: ParamType,
        _length: Option<usize>,
    ) -> Result<(), DbErr> {
        let value = value.to_sea_value(param_type);
        match self.bindings.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.bindings.push((key.clone(), value)),
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<ExecOutcome, DbErr> {
        let stmt = self.build()?;
        if parse_operation(&self.sql).returns_rows() {
            let rows = JsonValue::find_by_statement(stmt)
                .all(&*self.conn)
                .await?;
            self.rows = rows
                .into_iter()
                .filter_map(|row| match row {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            Ok(ExecOutcome {
                rows_affected: self.rows.len() as u64,
            })
        } else {
            let result = self.conn.execute(stmt).await?;
            self.rows.clear();
            Ok(ExecOutcome {
                rows_affected: result.rows_affected(),
            })
        }
    }

    async fn fetch_all(&mut self) -> Result<Vec<Row>, DbErr> {
        Ok(std::mem::take(&mut self.rows))
    }
}

/// A SeaORM `DatabaseConnection` whose statements end up in a [`QueryLogger`].
///
/// Statements prepared with [`prepare`](Self::prepare) are recorded with their
/// bound parameters. The wrapper also implements `ConnectionTrait`, so entity
/// queries run through it are recorded too.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use sea_orm::Database;
/// use sea_orm_querylog::{QueryLogConfig, QueryLogExt, QueryLogger};
///
/// let logger = Arc::new(QueryLogger::new(QueryLogConfig::development()));
/// let db = Database::connect("mysql://localhost/app").await?.with_query_log(logger.clone());
///
/// let users = Users::find().all(&db).await?;
/// for entry in logger.query_log().await? {
///     println!("{:?} {}", entry.elapsed, entry.formatted_query);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LoggedConnection {
    inner: Arc<DatabaseConnection>,
    logger: Arc<QueryLogger>,
}

impl LoggedConnection {
    pub fn new(connection: DatabaseConnection, logger: Arc<QueryLogger>) -> Self {
        Self::shared(Arc::new(connection), logger)
    }

    /// Wrap a connection that is already shared elsewhere.
    pub fn shared(connection: Arc<DatabaseConnection>, logger: Arc<QueryLogger>) -> Self {
        Self {
            inner: connection,
            logger,
        }
    }

    /// Wrap with a fresh logger using the default configuration.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        Self::new(connection, Arc::new(QueryLogger::default()))
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn logger(&self) -> &Arc<QueryLogger> {
        &self.logger
    }

    /// Consume the wrapper and return the shared inner connection.
    ///
    /// The explain pass holds its own handle while enabled, so
    /// `Arc::try_unwrap` only succeeds once explain is disabled again.
    pub fn into_inner(self) -> Arc<DatabaseConnection> {
        self.inner
    }

    pub fn prepare(&self, sql: &str) -> InstrumentedStatement {
        InstrumentedStatement::new(
            Box::new(SeaOrmStatement::new(self.inner.clone(), sql)),
            self.logger.clone(),
        )
    }

    /// Explain logged SELECTs against this connection when the log is read.
    pub fn enable_explain(&self) {
        self.logger
            .enable_explain(Arc::new(SeaOrmDriver::new(self.inner.clone())));
    }

    async fn observe<T, F>(&self, sql: String, params: Vec<Parameter>, operation: F) -> Result<T, DbErr>
    where
        F: Future<Output = Result<T, DbErr>> + Send,
        T: Send,
    {
        let span = query_span(&sql, self.logger.span_statements());
        let start = Instant::now();
        let result = operation.instrument(span.clone()).await;
        report(&self.logger, &span, &sql, &params, start.elapsed(), &result);
        result
    }
}

/// Statement values as ordinal parameters with types inferred from the value.
fn statement_params(stmt: &Statement) -> Vec<Parameter> {
    stmt.values
        .iter()
        .flat_map(|values| values.0.iter())
        .enumerate()
        .map(|(idx, value)| {
            let (value, param_type) = ParamValue::from_sea_value(value);
            Parameter::new(ParamKey::Position(idx + 1), value, param_type)
        })
        .collect()
}

impl From<DatabaseConnection> for LoggedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for LoggedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for LoggedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let params = statement_params(&stmt);
        self.observe(stmt.sql.clone(), params, self.inner.execute(stmt))
            .await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.observe(sql.to_string(), Vec::new(), self.inner.execute_unprepared(sql))
            .await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let params = statement_params(&stmt);
        self.observe(stmt.sql.clone(), params, self.inner.query_one(stmt))
            .await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let params = statement_params(&stmt);
        self.observe(stmt.sql.clone(), params, self.inner.query_all(stmt))
            .await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait QueryLogExt {
    /// Record every statement run through the returned connection in `logger`.
    fn with_query_log(self, logger: Arc<QueryLogger>) -> LoggedConnection;
}

impl QueryLogExt for DatabaseConnection {
    fn with_query_log(self, logger: Arc<QueryLogger>) -> LoggedConnection {
        LoggedConnection::new(self, logger)
    }
}

impl QueryLogExt for Arc<DatabaseConnection> {
    fn with_query_log(self, logger: Arc<QueryLogger>) -> LoggedConnection {
        LoggedConnection::shared(self, logger)
    }
}
