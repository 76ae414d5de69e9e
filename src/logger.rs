//! The query log: recorded entries, error entries and running totals.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sea_orm::DbErr;

use crate::callsite::BacktraceFilter;
use crate::config::QueryLogConfig;
use crate::driver::DriverConnection;
use crate::entry::{ErrorEntry, ExplainState, LogEntry, QueryError};
use crate::explain::ExplainEstimator;
use crate::format::format_query;
use crate::param::Parameter;
use crate::substitute::substitute_parameters;

/// Collects every statement executed through instrumented statements.
///
/// Create one per process or per request and share it behind an `Arc`.
/// Settings changed at runtime apply to executions recorded afterwards.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sea_orm_querylog::{Parameter, ParamType, QueryLogConfig, QueryLogger};
///
/// let logger = QueryLogger::new(QueryLogConfig::default().with_query_logging(true));
/// let params = [Parameter::positional(1, 42i64, ParamType::Int)];
/// logger.log_query("select * from users where id = ?", Duration::from_millis(3), &params);
///
/// assert_eq!(logger.total_queries(), 1);
/// ```
pub struct QueryLogger {
    state: Mutex<LogState>,
    last_start: Mutex<Option<Instant>>,
}

struct LogState {
    config: QueryLogConfig,
    backtracer: BacktraceFilter,
    log: Vec<LogEntry>,
    errors: Vec<ErrorEntry>,
    total_time: Duration,
    total_queries: u64,
    explain: Option<Arc<dyn DriverConnection>>,
}

impl LogState {
    fn render(&self, query: &str, params: &[Parameter]) -> String {
        let pretty = self.config.pretty_print;
        let query = if pretty {
            format_query(query)
        } else {
            query.to_string()
        };
        if params.is_empty() {
            query
        } else {
            substitute_parameters(&query, params, pretty)
        }
    }

    fn backtrace(&self) -> Vec<String> {
        self.backtracer.capture(self.config.backtrace_depth)
    }
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new(QueryLogConfig::default())
    }
}

impl fmt::Debug for QueryLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("QueryLogger")
            .field("config", &state.config)
            .field("entries", &state.log.len())
            .field("errors", &state.errors.len())
            .field("total_queries", &state.total_queries)
            .field("total_time", &state.total_time)
            .field("explain", &state.explain.is_some())
            .finish()
    }
}

impl QueryLogger {
    pub fn new(config: QueryLogConfig) -> Self {
        let mut backtracer = BacktraceFilter::new();
        for dir in &config.include_dirs {
            backtracer.add_include_dir(dir);
        }
        Self {
            state: Mutex::new(LogState {
                config,
                backtracer,
                log: Vec::new(),
                errors: Vec::new(),
                total_time: Duration::ZERO,
                total_queries: 0,
                explain: None,
            }),
            last_start: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp the start of an execution for [`log_end`](Self::log_end) or
    /// [`log_error`](Self::log_error).
    ///
    /// There is a single shared stamp, so overlapping executions measured this
    /// way corrupt each other's timings. Instrumented statements measure their
    /// own elapsed time and do not use it.
    pub fn log_start(&self) {
        *self
            .last_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn since_start(&self) -> Duration {
        self.last_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Record a success timed from the last [`log_start`](Self::log_start).
    pub fn log_end(&self, query: &str, params: &[Parameter]) {
        let elapsed = self.since_start();
        self.log_query(query, elapsed, params);
    }

    /// Record a failure timed from the last [`log_start`](Self::log_start).
    pub fn log_error(&self, query: &str, message: &str, code: &str, params: &[Parameter]) {
        let elapsed = self.since_start();
        self.log_failure(query, elapsed, code, message, params);
    }

    /// Record a successful execution.
    ///
    /// Totals are always updated. An entry is kept only while query logging is
    /// on, with a backtrace only in debug mode.
    pub fn log_query(&self, query: &str, elapsed: Duration, params: &[Parameter]) {
        let mut state = self.lock();
        state.total_time += elapsed;
        state.total_queries += 1;

        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed > state.config.slow_query_threshold {
            tracing::warn!(
                elapsed_ms,
                threshold_ms = state.config.slow_query_threshold.as_millis() as u64,
                query,
                "Slow query detected"
            );
        }

        if !state.config.query_logging {
            return;
        }

        let formatted_query = state.render(query, params);
        let trace = state.config.debug.then(|| state.backtrace());
        tracing::debug!(elapsed_ms, params = params.len(), query, "Query recorded");

        state.log.push(LogEntry {
            query: query.to_string(),
            formatted_query,
            params: params.to_vec(),
            elapsed,
            trace,
            explain: ExplainState::Pending,
        });
    }

    /// Record a failed execution. Kept when either query logging or debug
    /// mode is on; always carries a backtrace.
    pub fn log_failure(
        &self,
        query: &str,
        elapsed: Duration,
        code: &str,
        message: &str,
        params: &[Parameter],
    ) {
        let mut state = self.lock();
        tracing::error!(code, error = message, query, "Database query failed");

        if !(state.config.query_logging || state.config.debug) {
            return;
        }

        let formatted_query = state.render(query, params);
        let trace = state.backtrace();
        state.errors.push(ErrorEntry {
            query: query.to_string(),
            formatted_query,
            params: params.to_vec(),
            elapsed,
            trace,
            error: QueryError {
                code: code.to_string(),
                message: message.to_string(),
            },
        });
    }

    pub fn set_query_logging(&self, enabled: bool) -> &Self {
        self.lock().config.query_logging = enabled;
        self
    }

    /// Turning debug mode on also turns query logging on.
    pub fn set_debug(&self, enabled: bool) -> &Self {
        let mut state = self.lock();
        state.config.debug = enabled;
        if enabled {
            state.config.query_logging = true;
        }
        self
    }

    pub fn set_pretty_print(&self, enabled: bool) -> &Self {
        self.lock().config.pretty_print = enabled;
        self
    }

    pub fn set_backtrace_depth(&self, depth: usize) -> &Self {
        self.lock().config.backtrace_depth = depth;
        self
    }

    /// Run EXPLAIN for logged SELECTs on `connection` whenever the log is read.
    ///
    /// Each pending SELECT costs one extra round trip at read time.
    pub fn enable_explain(&self, connection: Arc<dyn DriverConnection>) -> &Self {
        self.lock().explain = Some(connection);
        self
    }

    pub fn disable_explain(&self) -> &Self {
        self.lock().explain = None;
        self
    }

    /// Restrict backtraces to frames from application code under `dir`.
    pub fn add_include_debug_dir(&self, dir: impl AsRef<Path>) -> &Self {
        let mut state = self.lock();
        state.config.include_dirs.push(dir.as_ref().to_path_buf());
        state.backtracer.add_include_dir(dir);
        self
    }

    pub fn is_query_logging(&self) -> bool {
        self.lock().config.query_logging
    }

    pub fn is_debug(&self) -> bool {
        self.lock().config.debug
    }

    pub fn is_pretty_print(&self) -> bool {
        self.lock().config.pretty_print
    }

    pub fn is_explain_enabled(&self) -> bool {
        self.lock().explain.is_some()
    }

    pub fn span_statements(&self) -> bool {
        self.lock().config.span_statements
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.lock().config.slow_query_threshold
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> QueryLogConfig {
        self.lock().config.clone()
    }

    /// All recorded entries in execution order.
    ///
    /// With explain mode on, SELECT entries that have not been explained yet
    /// are explained first. A failing EXPLAIN aborts the call.
    pub async fn query_log(&self) -> Result<Vec<LogEntry>, DbErr> {
        if let Some(estimator) = self.estimator() {
            let pending: Vec<(usize, LogEntry)> = {
                let state = self.lock();
                state
                    .log
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| !entry.is_explained())
                    .map(|(idx, entry)| (idx, entry.clone()))
                    .collect()
            };

            if !pending.is_empty() {
                tracing::debug!(pending = pending.len(), "Running explain pass");
            }
            for (idx, mut entry) in pending {
                estimator.estimate(&mut entry).await?;
                let mut state = self.lock();
                if let Some(slot) = state.log.get_mut(idx) {
                    if !slot.is_explained() {
                        slot.explain = entry.explain;
                    }
                }
            }
        }

        Ok(self.lock().log.clone())
    }

    fn estimator(&self) -> Option<ExplainEstimator> {
        let state = self.lock();
        let connection = state.explain.clone()?;
        Some(ExplainEstimator::new(connection).with_prefix(state.config.explain_prefix.clone()))
    }

    pub fn error_log(&self) -> Vec<ErrorEntry> {
        self.lock().errors.clone()
    }

    /// Number of successful executions, logged or not.
    pub fn total_queries(&self) -> u64 {
        self.lock().total_queries
    }

    /// Summed elapsed time of successful executions.
    pub fn total_time(&self) -> Duration {
        self.lock().total_time
    }
}
