//! Configuration for the query log.

use std::path::PathBuf;
use std::time::Duration;

use crate::callsite::DEFAULT_MAX_DEPTH;

/// Default statement prefix for the explain pass.
pub const DEFAULT_EXPLAIN_PREFIX: &str = "EXPLAIN EXTENDED";

/// Initial settings for a [`QueryLogger`](crate::QueryLogger).
///
/// Every flag can be changed later through the logger's setters; changes only
/// affect executions recorded afterwards.
///
/// # Example
///
/// ```rust
/// use sea_orm_querylog::QueryLogConfig;
/// use std::time::Duration;
///
/// let config = QueryLogConfig::default()
///     .with_query_logging(true)
///     .with_pretty_print(true)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct QueryLogConfig {
    /// Append an entry for every successful execution.
    /// Default: `false`
    pub query_logging: bool,

    /// Attach call-site backtraces to every entry. Implies `query_logging`.
    /// Default: `false`
    pub debug: bool,

    /// Break formatted queries over lines and emit HTML markup for keywords
    /// and parameter values.
    /// Default: `false`
    pub pretty_print: bool,

    /// Maximum number of frames kept per backtrace.
    /// Default: 10
    pub backtrace_depth: usize,

    /// Directories holding application code; when set, only frames from these
    /// directories appear in backtraces.
    pub include_dirs: Vec<PathBuf>,

    /// Executions slower than this are reported at WARN level.
    /// Default: 500ms
    pub slow_query_threshold: Duration,

    /// Statement prefix used by the explain pass.
    /// Default: `EXPLAIN EXTENDED`
    pub explain_prefix: String,

    /// Whether to include the SQL statement in tracing spans.
    /// Default: `false` (the statement may contain sensitive literals)
    pub span_statements: bool,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            query_logging: false,
            debug: false,
            pretty_print: false,
            backtrace_depth: DEFAULT_MAX_DEPTH,
            include_dirs: Vec::new(),
            slow_query_threshold: Duration::from_millis(500),
            explain_prefix: DEFAULT_EXPLAIN_PREFIX.to_string(),
            span_statements: false,
        }
    }
}

impl QueryLogConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep an entry for every successful execution, not just the totals.
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.query_logging = enabled;
        self
    }

    /// Enabling debug mode also enables query logging.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        if enabled {
            self.query_logging = true;
        }
        self
    }

    /// Render formatted queries with line breaks and HTML markup.
    pub fn with_pretty_print(mut self, enabled: bool) -> Self {
        self.pretty_print = enabled;
        self
    }

    /// Set how many application frames each backtrace keeps.
    pub fn with_backtrace_depth(mut self, depth: usize) -> Self {
        self.backtrace_depth = depth;
        self
    }

    /// Restrict backtraces to frames under `dir`. May be called repeatedly.
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Set the threshold for slow query warnings.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// MySQL 8 dropped `EXTENDED`; use plain `EXPLAIN` there.
    pub fn with_explain_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.explain_prefix = prefix.into();
        self
    }

    /// **Security Warning**: statements may embed credentials or PII as literals.
    pub fn with_span_statements(mut self, enabled: bool) -> Self {
        self.span_statements = enabled;
        self
    }

    /// Full logging with backtraces and pretty output.
    ///
    /// **Warning**: Do not use in production; every query and parameter is kept in memory.
    pub fn development() -> Self {
        Self {
            query_logging: true,
            debug: true,
            pretty_print: true,
            slow_query_threshold: Duration::from_millis(100),
            span_statements: true,
            ..Self::default()
        }
    }

    /// Counters only; nothing is retained per query.
    pub fn production() -> Self {
        Self {
            slow_query_threshold: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = QueryLogConfig::default()
            .with_pretty_print(true)
            .with_include_dir("/srv/app/src")
            .with_explain_prefix("EXPLAIN");

        assert!(config.pretty_print);
        assert!(!config.query_logging);
        assert_eq!(config.include_dirs, vec![PathBuf::from("/srv/app/src")]);
        assert_eq!(config.explain_prefix, "EXPLAIN");
    }

    #[test]
    fn test_debug_implies_logging() {
        let config = QueryLogConfig::new().with_debug(true);
        assert!(config.debug);
        assert!(config.query_logging);

        let config = config.with_debug(false);
        assert!(!config.debug);
        assert!(config.query_logging);
    }

    #[test]
    fn test_development_config() {
        let config = QueryLogConfig::development();
        assert!(config.query_logging);
        assert!(config.debug);
        assert!(config.pretty_print);
    }

    #[test]
    fn test_production_config() {
        let config = QueryLogConfig::production();
        assert!(!config.query_logging);
        assert!(!config.debug);
        assert_eq!(config.slow_query_threshold, Duration::from_secs(1));
    }
}
