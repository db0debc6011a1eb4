use crate::domains::export::csv_record::CsvRecord;
use crate::domains::export::cursor::{BeginTransaction, CursorSource, CursorTransaction};
use crate::domains::export::response::ChunkedResponse;
use crate::domains::export::types::{ExportConfig, ExportState, ExportStats};
use crate::domains::export::writers::ChunkedCsvWriter;
use crate::errors::{ExportError, ExportResult};
use crate::validation::Validate;
use std::time::Instant;

/// Runs one query-to-CSV export: open cursor, send headers, then fetch, write
/// and flush page by page until the cursor is exhausted.
///
/// Strictly sequential: a page is fully written and flushed before the next
/// fetch is issued, so at most one page of records is held at a time.
#[derive(Debug)]
pub struct CsvExport {
    config: ExportConfig,
    state: ExportState,
}

impl CsvExport {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            state: ExportState::Init,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn transition(&mut self, next: ExportState) {
        log::debug!("CSV export state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: ExportError) -> ExportError {
        log::error!("CSV export aborted in state {:?}: {}", self.state, error);
        self.transition(ExportState::Aborted);
        error
    }

    /// Stream the rows of `query` as `filename.csv` into `response`.
    ///
    /// Errors abort the export and are returned as-is. Anything already flushed
    /// stays with the client, so a failure mid-stream leaves a truncated file.
    pub async fn run<T, C, R>(
        &mut self,
        connection: &C,
        response: R,
        query: &str,
        filename: &str,
    ) -> ExportResult<ExportStats>
    where
        T: CsvRecord,
        C: BeginTransaction + ?Sized,
        C::Transaction: CursorTransaction<T>,
        R: ChunkedResponse,
    {
        if self.state != ExportState::Init {
            return Err(ExportError::InvalidState(format!(
                "export already ran and ended in {:?}",
                self.state
            )));
        }
        let started = Instant::now();

        if let Err(e) = self.config.validate() {
            return Err(self.fail(e.into()));
        }
        if response.is_closed() {
            return Err(self.fail(ExportError::Cancelled));
        }

        let mut cursor = match CursorSource::<T, C::Transaction>::open_with_config(connection, query, &self.config).await {
            Ok(cursor) => cursor,
            Err(e) => return Err(self.fail(e)),
        };
        let mut writer = ChunkedCsvWriter::<T, R>::with_config(response, &self.config);

        if let Err(e) = send_header(&mut writer, filename).await {
            release(&mut writer, cursor).await;
            return Err(self.fail(e));
        }
        self.transition(ExportState::HeaderSent);

        self.transition(ExportState::Streaming);
        if let Err(e) = transfer_chunks(&mut writer, &mut cursor).await {
            release(&mut writer, cursor).await;
            return Err(self.fail(e));
        }

        let pages_fetched = cursor.pages_fetched();
        if let Err(e) = cursor.close().await {
            return Err(self.fail(e));
        }
        if let Err(e) = writer.flush().await {
            return Err(self.fail(e));
        }
        self.transition(ExportState::Done);

        let writer_stats = writer.stats();
        let stats = ExportStats {
            rows_written: writer_stats.rows_written,
            pages_fetched,
            bytes_written: writer_stats.bytes_written,
            flushes: writer_stats.flushes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "CSV export {} completed: {}",
            filename,
            serde_json::to_string(&stats).unwrap_or_default()
        );
        Ok(stats)
    }
}

/// One-call export with the process-wide config and the given page size.
pub async fn transfer_csv_chunked<T, C, R>(
    connection: &C,
    response: R,
    query: &str,
    filename: &str,
    page_size: usize,
) -> ExportResult<ExportStats>
where
    T: CsvRecord,
    C: BeginTransaction + ?Sized,
    C::Transaction: CursorTransaction<T>,
    R: ChunkedResponse,
{
    let config = crate::globals::export_config().with_page_size(page_size);
    CsvExport::new(config)
        .run::<T, C, R>(connection, response, query, filename)
        .await
}

/// Fetch, write and flush pages until the cursor returns an empty page.
/// The column header must already be written. Returns the number of pages written.
pub async fn transfer_chunks<T, Tx, R>(
    writer: &mut ChunkedCsvWriter<T, R>,
    cursor: &mut CursorSource<T, Tx>,
) -> ExportResult<usize>
where
    T: CsvRecord,
    Tx: CursorTransaction<T>,
    R: ChunkedResponse,
{
    if !writer.header_written() {
        return Err(ExportError::InvalidState(
            "column header must be written before streaming rows".to_string(),
        ));
    }

    let mut pages = 0;
    loop {
        ensure_connected(writer)?;
        let page = cursor.fetch_next().await?;
        if page.is_empty() {
            break;
        }

        writer.write_rows(&page).await?;
        ensure_connected(writer)?;
        writer.flush().await?;
        pages += 1;
        log::debug!("Flushed page {} ({} rows)", pages, page.len());
    }
    Ok(pages)
}

async fn send_header<T, R>(writer: &mut ChunkedCsvWriter<T, R>, filename: &str) -> ExportResult<()>
where
    T: CsvRecord,
    R: ChunkedResponse,
{
    writer.send_framing_headers(filename).await?;
    writer.write_column_header().await?;
    ensure_connected(writer)?;
    writer.flush().await
}

fn ensure_connected<T, R>(writer: &ChunkedCsvWriter<T, R>) -> ExportResult<()>
where
    T: CsvRecord,
    R: ChunkedResponse,
{
    if writer.is_closed() {
        return Err(ExportError::Cancelled);
    }
    Ok(())
}

/// Best-effort cleanup on the abort path: flush whatever is buffered, then
/// close and roll back the cursor.
async fn release<T, Tx, R>(writer: &mut ChunkedCsvWriter<T, R>, cursor: CursorSource<T, Tx>)
where
    T: CsvRecord,
    Tx: CursorTransaction<T>,
    R: ChunkedResponse,
{
    if !writer.is_closed() {
        if let Err(e) = writer.flush().await {
            log::warn!("Could not flush buffered CSV output while aborting: {}", e);
        }
    }
    cursor.abort().await;
}
