//! Prepared statement decorator that reports to the query log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sea_orm::DbErr;
use tracing::{field, Instrument, Span};

use crate::driver::{error_code, error_message, DriverStatement, ExecOutcome, Row};
use crate::logger::QueryLogger;
use crate::param::{ParamKey, ParamType, ParamValue, Parameter, ParameterSet};
use crate::parser::ParsedSql;

/// A driver statement whose binds and executions are recorded.
///
/// Bound parameters are remembered so the log can show the query with its
/// values inlined. Results and errors from the driver are returned unchanged.
///
/// # Example
///
/// ```rust,ignore
/// let mut stmt = connection.prepare("select * from users where id = ?");
/// stmt.bind_value(1, 42, ParamType::Int)?;
/// stmt.execute().await?;
/// let rows = stmt.fetch_all().await?;
/// ```
pub struct InstrumentedStatement {
    inner: Box<dyn DriverStatement>,
    logger: Option<Arc<QueryLogger>>,
    params: ParameterSet,
}

impl InstrumentedStatement {
    pub fn new(inner: Box<dyn DriverStatement>, logger: Arc<QueryLogger>) -> Self {
        Self {
            inner,
            logger: Some(logger),
            params: ParameterSet::new(),
        }
    }

    /// A statement that forwards to the driver without reporting anything.
    ///
    /// Used for statements issued by the log itself, such as the explain pass.
    pub fn uninstrumented(inner: Box<dyn DriverStatement>) -> Self {
        Self {
            inner,
            logger: None,
            params: ParameterSet::new(),
        }
    }

    pub fn is_instrumented(&self) -> bool {
        self.logger.is_some()
    }

    pub fn query(&self) -> &str {
        self.inner.sql()
    }

    /// Parameters bound so far, in bind order.
    pub fn params(&self) -> &[Parameter] {
        self.params.as_slice()
    }

    pub fn bind_value(
        &mut self,
        key: impl Into<ParamKey>,
        value: impl Into<ParamValue>,
        param_type: ParamType,
    ) -> Result<(), DbErr> {
        self.bind_param(key, value, param_type, None)
    }

    /// Bind with an optional declared length.
    pub fn bind_param(
        &mut self,
        key: impl Into<ParamKey>,
        value: impl Into<ParamValue>,
        param_type: ParamType,
        length: Option<usize>,
    ) -> Result<(), DbErr> {
        let param = Parameter::new(key, value, param_type).with_length(length);
        self.params.insert(param.clone());
        self.inner
            .bind(&param.key, &param.value, param.param_type, param.length)
    }

    /// Execute with the parameters bound so far.
    pub async fn execute(&mut self) -> Result<ExecOutcome, DbErr> {
        self.run(Vec::new()).await
    }

    /// Execute with extra parameters, recorded and bound as strings first.
    pub async fn execute_with<I, K, V>(&mut self, params: I) -> Result<ExecOutcome, DbErr>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamKey>,
        V: Into<ParamValue>,
    {
        let overrides = params
            .into_iter()
            .map(|(key, value)| Parameter::new(key, value, ParamType::Str))
            .collect();
        self.run(overrides).await
    }

    /// Rows produced by the last execution.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>, DbErr> {
        self.inner.fetch_all().await
    }

    async fn run(&mut self, overrides: Vec<Parameter>) -> Result<ExecOutcome, DbErr> {
        let Some(logger) = self.logger.clone() else {
            self.bind_overrides(overrides)?;
            return self.inner.execute().await;
        };

        let start = Instant::now();
        let span = query_span(self.inner.sql(), logger.span_statements());
        let result = match span.in_scope(|| self.bind_overrides(overrides)) {
            Ok(()) => self.inner.execute().instrument(span.clone()).await,
            Err(e) => Err(e),
        };

        report(
            &logger,
            &span,
            self.inner.sql(),
            self.params.as_slice(),
            start.elapsed(),
            &result,
        );
        result
    }

    fn bind_overrides(&mut self, overrides: Vec<Parameter>) -> Result<(), DbErr> {
        for param in overrides {
            self.params.insert(param.clone());
            self.inner
                .bind(&param.key, &param.value, param.param_type, param.length)?;
        }
        Ok(())
    }
}

/// Create a tracing span for one execution.
pub(crate) fn query_span(sql: &str, record_statement: bool) -> Span {
    let parsed = ParsedSql::parse(sql);
    let span = tracing::info_span!(
        "db.query",
        otel.name = %parsed.span_name(),
        db.operation = %parsed.operation.as_str(),
        db.sql.table = field::Empty,
        db.statement = field::Empty,
        db.duration_ms = field::Empty,
        otel.status_code = field::Empty,
        error.message = field::Empty,
        slow_query = field::Empty,
    );

    if let Some(table) = &parsed.table {
        span.record("db.sql.table", table.as_str());
    }
    if record_statement {
        span.record("db.statement", sql);
    }
    span
}

/// Record the outcome on the span and hand it to the logger.
pub(crate) fn report<T>(
    logger: &QueryLogger,
    span: &Span,
    sql: &str,
    params: &[Parameter],
    elapsed: Duration,
    result: &Result<T, DbErr>,
) {
    span.record("db.duration_ms", elapsed.as_millis() as i64);
    if elapsed > logger.slow_query_threshold() {
        span.record("slow_query", true);
    }

    span.in_scope(|| match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
            logger.log_query(sql, elapsed, params);
        }
        Err(e) => {
            let message = error_message(e);
            span.record("otel.status_code", "ERROR");
            span.record("error.message", message.as_str());
            logger.log_failure(sql, elapsed, &error_code(e), &message, params);
        }
    });
}
