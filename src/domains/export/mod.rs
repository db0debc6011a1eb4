pub mod types;
pub mod csv_record;
pub mod cursor;
pub mod response;
pub mod writers;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use types::{ExportConfig, ExportState, ExportStats, LineTerminator};
pub use csv_record::{CsvRecord, ToCsvValue};
pub use cursor::{BeginTransaction, CursorSource, CursorTransaction};
pub use response::{ChunkedBody, ChunkedBodyReceiver, ChunkedResponse, HttpChunkedWriter};
pub use writers::{ChunkedCsvWriter, WriterStats};
pub use service::{transfer_chunks, transfer_csv_chunked, CsvExport};
