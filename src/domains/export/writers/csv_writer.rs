use crate::domains::export::csv_record::CsvRecord;
use crate::domains::export::response::ChunkedResponse;
use crate::domains::export::types::{ExportConfig, LineTerminator};
use crate::errors::{ExportError, ExportResult};
use std::marker::PhantomData;

/// UTF-8 byte-order mark, so spreadsheet applications detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const CONTENT_TYPE: &str = "Content-Type";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const CONTENT_DESCRIPTION: &str = "Content-Description";

/// Writer-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub rows_written: usize,
    pub bytes_written: usize,
    pub flushes: usize,
}

/// Streams CSV rows of `T` into a chunked response, one flushed chunk per page.
///
/// Call order is enforced: framing headers at most once, the column header
/// exactly once, and data rows only after the column header.
pub struct ChunkedCsvWriter<T: CsvRecord, R: ChunkedResponse> {
    response: R,
    terminator: LineTerminator,
    write_bom: bool,
    content_description: bool,
    framing_sent: bool,
    header_written: bool,
    buffer: Vec<u8>,
    stats: WriterStats,
    _record: PhantomData<fn(&T)>,
}

impl<T: CsvRecord, R: ChunkedResponse> ChunkedCsvWriter<T, R> {
    pub fn new(response: R) -> Self {
        Self::with_config(response, &ExportConfig::default())
    }

    pub fn with_config(response: R, config: &ExportConfig) -> Self {
        Self {
            response,
            terminator: config.line_terminator,
            write_bom: config.write_bom,
            content_description: config.content_description,
            framing_sent: false,
            header_written: false,
            buffer: Vec::with_capacity(8 * 1024),
            stats: WriterStats::default(),
            _record: PhantomData,
        }
    }

    /// Set the download headers and write the BOM as the first body bytes.
    pub async fn send_framing_headers(&mut self, filename: &str) -> ExportResult<()> {
        if self.framing_sent {
            return Err(ExportError::InvalidState("framing headers already sent".to_string()));
        }
        self.framing_sent = true;

        self.response.set_header(CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref());
        self.response.set_header(TRANSFER_ENCODING, "chunked");
        self.response.set_header(CONTENT_DISPOSITION, &content_disposition(filename));
        if self.content_description {
            self.response.set_header(CONTENT_DESCRIPTION, "File Transfer");
        }

        if self.write_bom {
            self.response.write_all(UTF8_BOM).await?;
            self.stats.bytes_written += UTF8_BOM.len();
        }
        Ok(())
    }

    /// Write the column names of `T` as the first CSV line.
    pub async fn write_column_header(&mut self) -> ExportResult<()> {
        if self.header_written {
            return Err(ExportError::InvalidState("column header already written".to_string()));
        }

        self.buffer.clear();
        {
            let mut wtr = csv::WriterBuilder::new()
                .terminator(self.terminator.to_csv())
                .from_writer(&mut self.buffer);
            wtr.write_record(T::HEADERS)?;
            wtr.flush()?;
        }
        self.push_buffer().await?;
        self.header_written = true;

        log::debug!("Wrote CSV header with {} columns", T::HEADERS.len());
        Ok(())
    }

    /// Serialize one page of records. Bytes are handed to the response but not
    /// flushed; call [`flush`](Self::flush) afterwards.
    pub async fn write_rows(&mut self, page: &[T]) -> ExportResult<()> {
        if !self.header_written {
            return Err(ExportError::InvalidState(
                "data rows written before the column header".to_string(),
            ));
        }
        if page.is_empty() {
            return Ok(());
        }

        let columns = T::HEADERS.len();
        self.buffer.clear();
        {
            let mut wtr = csv::WriterBuilder::new()
                .terminator(self.terminator.to_csv())
                .from_writer(&mut self.buffer);
            for record in page {
                let values = record.csv_values();
                if values.len() != columns {
                    return Err(ExportError::Write(format!(
                        "record has {} values but the header has {} columns",
                        values.len(),
                        columns
                    )));
                }
                wtr.write_record(values.iter().map(|v| v.as_bytes()))?;
            }
            wtr.flush()?;
        }
        self.push_buffer().await?;
        self.stats.rows_written += page.len();
        Ok(())
    }

    /// Push buffered bytes to the client now.
    pub async fn flush(&mut self) -> ExportResult<()> {
        self.response.flush().await?;
        self.stats.flushes += 1;
        Ok(())
    }

    async fn push_buffer(&mut self) -> ExportResult<()> {
        self.response.write_all(&self.buffer).await?;
        self.stats.bytes_written += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// True once the client has gone away.
    pub fn is_closed(&self) -> bool {
        self.response.is_closed()
    }

    pub fn response(&self) -> &R {
        &self.response
    }

    pub fn into_inner(self) -> R {
        self.response
    }
}

/// `attachment; filename="<name>.csv"`, with an RFC 5987 `filename*` when the
/// name is not plain ASCII.
pub fn content_disposition(filename: &str) -> String {
    let cleaned: String = filename
        .trim()
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = if cleaned.is_empty() { "export".to_string() } else { cleaned };

    if cleaned.is_ascii() {
        return format!("attachment; filename=\"{}.csv\"", cleaned);
    }

    let fallback: String = cleaned
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}.csv\"; filename*=UTF-8''{}.csv",
        fallback,
        urlencoding::encode(&cleaned)
    )
}
