//! In-memory stand-ins for the database side of an export.

use crate::domains::export::cursor::{BeginTransaction, CursorTransaction};
use crate::errors::{DbError, DbResult};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct TestRow {
    pub id: i64,
    pub name: String,
    pub score: Option<f64>,
}

crate::impl_csv_record!(TestRow {
    "id" => id,
    "name" => name,
    "score" => score,
});

pub fn numbered_rows(count: usize) -> Vec<TestRow> {
    (1..=count as i64)
        .map(|id| TestRow {
            id,
            name: format!("row-{}", id),
            score: if id % 2 == 0 { Some(id as f64 / 2.0) } else { None },
        })
        .collect()
}

/// Single-connection pool on `DATABASE_URL`, so consecutive exports reuse one
/// backend session. `None` when no database is configured.
pub async fn postgres_pool() -> Option<PgPool> {
    let _ = dotenv::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");
    Some(pool)
}

/// Where the mock backend should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    None,
    Begin,
    Declare,
    /// Fail the n-th `FETCH` (1-based).
    Fetch(usize),
    Close,
    Commit,
}

#[derive(Debug, Default, Clone)]
pub struct StatementLog {
    statements: Vec<String>,
    committed: bool,
    fetches: usize,
    largest_page: usize,
}

impl StatementLog {
    pub fn statements(&self) -> Vec<String> {
        self.statements.clone()
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn largest_page(&self) -> usize {
        self.largest_page
    }
}

type RowSource<T> = Box<dyn Iterator<Item = T> + Send>;

/// Connection whose single transaction serves rows from an iterator, so large
/// result sets never sit in memory all at once.
pub struct MockConnection<T> {
    rows: Mutex<Option<RowSource<T>>>,
    fail: FailPoint,
    log: Arc<Mutex<StatementLog>>,
}

impl<T: Send + 'static> MockConnection<T> {
    pub fn with_rows(rows: Vec<T>) -> Self {
        Self::streaming(rows.into_iter())
    }

    pub fn streaming<I>(rows: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        Self {
            rows: Mutex::new(Some(Box::new(rows))),
            fail: FailPoint::None,
            log: Arc::new(Mutex::new(StatementLog::default())),
        }
    }

    pub fn failing_at(mut self, fail: FailPoint) -> Self {
        self.fail = fail;
        self
    }

    pub fn log(&self) -> StatementLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Send + 'static> BeginTransaction for MockConnection<T> {
    type Transaction = MockTransaction<T>;

    async fn begin(&self) -> DbResult<MockTransaction<T>> {
        if self.fail == FailPoint::Begin {
            return Err(DbError::Transaction("connection refused".to_string()));
        }
        let rows = self
            .rows
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DbError::Transaction("mock connection already used".to_string()))?;
        self.log.lock().unwrap().statements.push("BEGIN".to_string());
        Ok(MockTransaction {
            rows,
            fail: self.fail,
            log: self.log.clone(),
            declared: false,
        })
    }
}

pub struct MockTransaction<T> {
    rows: RowSource<T>,
    fail: FailPoint,
    log: Arc<Mutex<StatementLog>>,
    declared: bool,
}

impl<T> MockTransaction<T> {
    fn record(&self, sql: &str) {
        self.log.lock().unwrap().statements.push(sql.to_string());
    }
}

#[async_trait]
impl<T: Send + 'static> CursorTransaction<T> for MockTransaction<T> {
    async fn execute(&mut self, sql: &str) -> DbResult<()> {
        self.record(sql);
        if sql.starts_with("DECLARE") {
            if self.fail == FailPoint::Declare {
                return Err(DbError::Query("syntax error in cursor query".to_string()));
            }
            self.declared = true;
        } else if sql.starts_with("CLOSE") {
            if self.fail == FailPoint::Close || !self.declared {
                return Err(DbError::Query("cursor does not exist".to_string()));
            }
            self.declared = false;
        }
        Ok(())
    }

    async fn fetch(&mut self, sql: &str) -> DbResult<Vec<T>> {
        self.record(sql);
        let fetch_number = {
            let mut log = self.log.lock().unwrap();
            log.fetches += 1;
            log.fetches
        };
        if self.fail == FailPoint::Fetch(fetch_number) {
            return Err(DbError::Decode("column \"score\" has unexpected type".to_string()));
        }
        if !self.declared {
            return Err(DbError::Query("cursor does not exist".to_string()));
        }

        let count = sql
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| DbError::Query(format!("unsupported statement: {}", sql)))?;

        let page: Vec<T> = self.rows.by_ref().take(count).collect();
        let mut log = self.log.lock().unwrap();
        log.largest_page = log.largest_page.max(page.len());
        Ok(page)
    }

    async fn commit(self) -> DbResult<()> {
        self.record("COMMIT");
        if self.fail == FailPoint::Commit {
            return Err(DbError::Transaction("could not serialize access".to_string()));
        }
        self.log.lock().unwrap().committed = true;
        Ok(())
    }

    async fn rollback(self) -> DbResult<()> {
        self.record("ROLLBACK");
        Ok(())
    }
}
