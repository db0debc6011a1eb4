use crate::domains::export::types::{ExportConfig, DEFAULT_CURSOR_NAME, MAX_PAGE_SIZE};
use crate::errors::{DbError, DbResult, ExportError, ExportResult};
use crate::validation::validate_cursor_name;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{FromRow, Postgres, Transaction};
use std::marker::PhantomData;

/// An open transaction able to run the cursor statements and decode fetched rows into `T`.
#[async_trait]
pub trait CursorTransaction<T>: Send + Sized {
    /// Run a statement that returns no rows (`DECLARE`, `CLOSE`).
    async fn execute(&mut self, sql: &str) -> DbResult<()>;

    /// Run a statement and decode every returned row (`FETCH`).
    async fn fetch(&mut self, sql: &str) -> DbResult<Vec<T>>;

    async fn commit(self) -> DbResult<()>;

    async fn rollback(self) -> DbResult<()>;
}

/// Anything a cursor transaction can be started on.
#[async_trait]
pub trait BeginTransaction: Send + Sync {
    type Transaction: Send;

    async fn begin(&self) -> DbResult<Self::Transaction>;
}

#[async_trait]
impl BeginTransaction for PgPool {
    type Transaction = Transaction<'static, Postgres>;

    async fn begin(&self) -> DbResult<Self::Transaction> {
        Ok(PgPool::begin(self).await?)
    }
}

#[async_trait]
impl<T> CursorTransaction<T> for Transaction<'static, Postgres>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    async fn execute(&mut self, sql: &str) -> DbResult<()> {
        // Unprepared: statement text repeats across queries on a pooled
        // connection, and FETCH must be described against the current cursor.
        sqlx::query(sql).persistent(false).execute(&mut **self).await?;
        Ok(())
    }

    async fn fetch(&mut self, sql: &str) -> DbResult<Vec<T>> {
        let rows = sqlx::query_as::<_, T>(sql)
            .persistent(false)
            .fetch_all(&mut **self)
            .await?;
        Ok(rows)
    }

    async fn commit(self) -> DbResult<()> {
        Transaction::commit(self).await?;
        Ok(())
    }

    async fn rollback(self) -> DbResult<()> {
        Transaction::rollback(self).await?;
        Ok(())
    }
}

/// Server-side cursor over one query, read one bounded page at a time.
///
/// Owns its transaction for the whole export. `close` and `abort` consume the
/// source so the transaction cannot outlive it in an unknown state.
pub struct CursorSource<T, Tx: CursorTransaction<T>> {
    tx: Tx,
    cursor_name: String,
    page_size: usize,
    fetch_sql: String,
    pages_fetched: usize,
    rows_fetched: usize,
    exhausted: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T, Tx: CursorTransaction<T>> std::fmt::Debug for CursorSource<T, Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorSource")
            .field("cursor_name", &self.cursor_name)
            .field("page_size", &self.page_size)
            .field("pages_fetched", &self.pages_fetched)
            .field("rows_fetched", &self.rows_fetched)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<T, Tx: CursorTransaction<T>> CursorSource<T, Tx> {
    /// Begin a transaction on `connection` and declare the default cursor over `query`.
    pub async fn open<C>(connection: &C, query: &str, page_size: usize) -> ExportResult<Self>
    where
        C: BeginTransaction<Transaction = Tx> + ?Sized,
    {
        let config = ExportConfig::default().with_page_size(page_size);
        Self::open_with_config(connection, query, &config).await
    }

    pub async fn open_with_config<C>(connection: &C, query: &str, config: &ExportConfig) -> ExportResult<Self>
    where
        C: BeginTransaction<Transaction = Tx> + ?Sized,
    {
        check_page_size(config.page_size)?;
        validate_cursor_name(&config.cursor_name)?;

        let tx = connection.begin().await.map_err(|e| {
            log::error!("Failed to begin cursor transaction: {}", e);
            ExportError::CursorOpen(e)
        })?;

        Self::declare_named(tx, query, config.page_size, &config.cursor_name).await
    }

    /// Declare the default cursor inside a transaction the caller already started.
    pub async fn declare(tx: Tx, query: &str, page_size: usize) -> ExportResult<Self> {
        Self::declare_named(tx, query, page_size, DEFAULT_CURSOR_NAME).await
    }

    /// Declare `cursor_name` over `query`. On failure the transaction is rolled back
    /// before the error is returned.
    pub async fn declare_named(mut tx: Tx, query: &str, page_size: usize, cursor_name: &str) -> ExportResult<Self> {
        check_page_size(page_size)?;
        validate_cursor_name(cursor_name)?;

        let declare_sql = format!("DECLARE {} CURSOR FOR {}", cursor_name, query);
        log::debug!("Declaring cursor {} with page size {}", cursor_name, page_size);

        if let Err(e) = tx.execute(&declare_sql).await {
            log::error!("Failed to declare cursor {}: {}", cursor_name, e);
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("Rollback after failed DECLARE also failed: {}", rollback_err);
            }
            return Err(ExportError::CursorOpen(e));
        }

        Ok(Self {
            tx,
            cursor_name: cursor_name.to_string(),
            page_size,
            fetch_sql: format!("FETCH {} FROM {}", page_size, cursor_name),
            pages_fetched: 0,
            rows_fetched: 0,
            exhausted: false,
            _record: PhantomData,
        })
    }

    /// Fetch up to `page_size` rows. An empty page means the cursor is exhausted;
    /// calling again after that keeps returning empty pages.
    pub async fn fetch_next(&mut self) -> ExportResult<Vec<T>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let page = self.tx.fetch(&self.fetch_sql).await.map_err(|e| {
            log::error!(
                "Fetch from cursor {} failed after {} rows: {}",
                self.cursor_name, self.rows_fetched, e
            );
            ExportError::CursorFetch(e)
        })?;

        if page.len() > self.page_size {
            return Err(ExportError::CursorFetch(DbError::Query(format!(
                "FETCH returned {} rows, more than the page size {}",
                page.len(),
                self.page_size
            ))));
        }

        if page.is_empty() {
            self.exhausted = true;
            log::debug!(
                "Cursor {} exhausted after {} pages, {} rows",
                self.cursor_name, self.pages_fetched, self.rows_fetched
            );
        } else {
            self.pages_fetched += 1;
            self.rows_fetched += page.len();
        }

        Ok(page)
    }

    /// Close the cursor and commit.
    ///
    /// If `CLOSE` fails the commit is skipped and the transaction is rolled back
    /// instead, so it is never left open.
    pub async fn close(mut self) -> ExportResult<()> {
        let close_sql = format!("CLOSE {}", self.cursor_name);
        if let Err(e) = self.tx.execute(&close_sql).await {
            log::error!("Failed to close cursor {}: {}", self.cursor_name, e);
            if let Err(rollback_err) = self.tx.rollback().await {
                log::warn!("Rollback after failed CLOSE also failed: {}", rollback_err);
            }
            return Err(ExportError::CursorClose(e));
        }

        self.tx.commit().await.map_err(|e| {
            log::error!("Failed to commit cursor transaction: {}", e);
            ExportError::CursorClose(e)
        })?;

        log::debug!("Cursor {} closed and committed", self.cursor_name);
        Ok(())
    }

    /// Best-effort release after a failed export: try `CLOSE`, then roll back.
    /// Failures are logged and swallowed so the triggering error stays visible.
    pub async fn abort(mut self) {
        let close_sql = format!("CLOSE {}", self.cursor_name);
        if let Err(e) = self.tx.execute(&close_sql).await {
            log::warn!("Could not close cursor {} while aborting: {}", self.cursor_name, e);
        }
        if let Err(e) = self.tx.rollback().await {
            log::warn!("Could not roll back cursor transaction while aborting: {}", e);
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cursor_name(&self) -> &str {
        &self.cursor_name
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn rows_fetched(&self) -> usize {
        self.rows_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

fn check_page_size(page_size: usize) -> ExportResult<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ExportError::InvalidConfig(format!(
            "page size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}
