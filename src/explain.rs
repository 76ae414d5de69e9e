//! Heuristic cost estimation from EXPLAIN output.

use std::sync::Arc;

use sea_orm::DbErr;
use serde_json::Value as JsonValue;

use crate::config::DEFAULT_EXPLAIN_PREFIX;
use crate::driver::{DriverConnection, Row};
use crate::entry::{ExplainState, LogEntry};
use crate::parser::is_select_statement;
use crate::statement::InstrumentedStatement;

/// Re-runs logged SELECTs under EXPLAIN and scores them.
#[derive(Clone)]
pub struct ExplainEstimator {
    connection: Arc<dyn DriverConnection>,
    prefix: String,
}

impl ExplainEstimator {
    pub fn new(connection: Arc<dyn DriverConnection>) -> Self {
        Self {
            connection,
            prefix: DEFAULT_EXPLAIN_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Explain `entry` in place. Entries already visited are left untouched;
    /// anything other than a SELECT is marked not applicable without a round trip.
    pub async fn estimate(&self, entry: &mut LogEntry) -> Result<(), DbErr> {
        if entry.is_explained() {
            return Ok(());
        }
        if !is_select_statement(&entry.query) {
            entry.explain = ExplainState::NotApplicable;
            return Ok(());
        }

        let sql = format!("{} {}", self.prefix, entry.query);
        let mut stmt = InstrumentedStatement::uninstrumented(self.connection.prepare(&sql)?);
        for param in &entry.params {
            stmt.bind_value(param.key.clone(), param.value.clone(), param.param_type)?;
        }
        stmt.execute().await?;
        let rows = stmt.fetch_all().await?;

        let cost = explain_cost(&rows);
        tracing::debug!(cost, rows = rows.len(), query = %entry.query, "Query explained");
        entry.explain = ExplainState::Explained { rows, cost };
        Ok(())
    }
}

/// `ceil(4 * sum(1 - filtered / 100))` over the plan rows.
///
/// A row without a usable `filtered` column counts as filtering nothing out.
pub fn explain_cost(rows: &[Row]) -> i64 {
    let complexity: f64 = rows.iter().map(|row| 1.0 - filtered(row) / 100.0).sum();
    (complexity * 4.0).ceil() as i64
}

fn filtered(row: &Row) -> f64 {
    let value = row
        .iter()
        .find(|(column, _)| column.eq_ignore_ascii_case("filtered"))
        .map(|(_, value)| value);
    match value {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::mock::MockDriver;
    use crate::param::{ParamKey, ParamType, ParamValue, Parameter};

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn entry(query: &str, params: Vec<Parameter>) -> LogEntry {
        LogEntry {
            query: query.to_string(),
            formatted_query: query.to_string(),
            params,
            elapsed: Duration::ZERO,
            trace: None,
            explain: ExplainState::Pending,
        }
    }

    #[test]
    fn test_explain_cost() {
        assert_eq!(explain_cost(&[]), 0);
        assert_eq!(explain_cost(&[row(json!({"filtered": 100}))]), 0);
        assert_eq!(explain_cost(&[row(json!({"filtered": 50.0}))]), 2);
        assert_eq!(
            explain_cost(&[row(json!({"filtered": 50})), row(json!({"FILTERED": "10.00"}))]),
            6
        );
        assert_eq!(explain_cost(&[row(json!({"id": 1, "filtered": null}))]), 4);
    }

    #[tokio::test]
    async fn test_non_select_issues_no_query() {
        let driver = MockDriver::new();
        let estimator = ExplainEstimator::new(Arc::new(driver.clone()));
        let mut update = entry("UPDATE t SET a = 1", Vec::new());

        estimator.estimate(&mut update).await.unwrap();

        assert_eq!(update.explain, ExplainState::NotApplicable);
        assert_eq!(update.cost(), None);
        assert!(driver.prepared().is_empty());
    }

    #[tokio::test]
    async fn test_select_binds_original_values() {
        let driver = MockDriver::new().with_rows(vec![row(json!({"filtered": 25}))]);
        let estimator = ExplainEstimator::new(Arc::new(driver.clone())).with_prefix("EXPLAIN");
        let mut select = entry(
            "  (select * from t where a = ? and b = :b)",
            vec![
                Parameter::positional(1, 3i64, ParamType::Int),
                Parameter::named(":b", "x", ParamType::Str),
            ],
        );

        estimator.estimate(&mut select).await.unwrap();

        assert_eq!(select.cost(), Some(3));
        let executed = driver.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0, "EXPLAIN   (select * from t where a = ? and b = :b)");
        assert_eq!(
            executed[0].1,
            vec![
                (ParamKey::Position(1), ParamValue::Int(3)),
                (ParamKey::from(":b"), ParamValue::from("x")),
            ]
        );
    }

    #[tokio::test]
    async fn test_estimate_is_idempotent() {
        let driver = MockDriver::new();
        let estimator = ExplainEstimator::new(Arc::new(driver.clone()));
        let mut select = entry("select 1", Vec::new());
        select.explain = ExplainState::Explained {
            rows: Vec::new(),
            cost: 9,
        };

        estimator.estimate(&mut select).await.unwrap();

        assert_eq!(select.cost(), Some(9));
        assert!(driver.prepared().is_empty());
    }
}
