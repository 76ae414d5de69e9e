//! Scripted in-memory driver for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::{DbErr, RuntimeErr};

use crate::driver::{DriverConnection, DriverStatement, ExecOutcome, Row};
use crate::param::{ParamKey, ParamType, ParamValue};

type Bindings = Vec<(ParamKey, ParamValue)>;

#[derive(Default)]
struct Journal {
    prepared: Vec<String>,
    executed: Vec<(String, Bindings)>,
}

/// Returns the same rows for every statement, or fails every execute.
#[derive(Clone, Default)]
pub(crate) struct MockDriver {
    journal: Arc<Mutex<Journal>>,
    rows: Vec<Row>,
    failure: Option<String>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub(crate) fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub(crate) fn prepared(&self) -> Vec<String> {
        self.journal.lock().unwrap().prepared.clone()
    }

    pub(crate) fn executed(&self) -> Vec<(String, Bindings)> {
        self.journal.lock().unwrap().executed.clone()
    }
}

impl DriverConnection for MockDriver {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DbErr> {
        self.journal.lock().unwrap().prepared.push(sql.to_string());
        Ok(Box::new(MockStatement {
            driver: self.clone(),
            sql: sql.to_string(),
            bindings: Vec::new(),
            executed: false,
        }))
    }
}

struct MockStatement {
    driver: MockDriver,
    sql: String,
    bindings: Bindings,
    executed: bool,
}

#[async_trait]
impl DriverStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        key: &ParamKey,
        value: &ParamValue,
        _param_type: ParamType,
        _length: Option<usize>,
    ) -> Result<(), DbErr> {
        match self.bindings.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.clone(),
            None => self.bindings.push((key.clone(), value.clone())),
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<ExecOutcome, DbErr> {
        self.driver
            .journal
            .lock()
            .unwrap()
            .executed
            .push((self.sql.clone(), self.bindings.clone()));

        if let Some(message) = &self.driver.failure {
            return Err(DbErr::Exec(RuntimeErr::Internal(message.clone())));
        }
        self.executed = true;
        Ok(ExecOutcome {
            rows_affected: self.driver.rows.len() as u64,
        })
    }

    async fn fetch_all(&mut self) -> Result<Vec<Row>, DbErr> {
        if !self.executed {
            return Err(DbErr::Custom("statement has not been executed".to_string()));
        }
        Ok(self.driver.rows.clone())
    }
}
