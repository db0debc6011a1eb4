//! Stream large query results to HTTP clients as chunked CSV downloads.
//!
//! Rows are paged out of PostgreSQL through a server-side cursor
//! (`DECLARE` / `FETCH n` / `CLOSE`) inside one transaction, and every page is
//! serialized and flushed to the client before the next one is fetched, so
//! memory stays bounded by the page size.
//!
//! ```ignore
//! use csv_stream_export::domains::export::{transfer_csv_chunked, ChunkedBody};
//! use csv_stream_export::impl_csv_record;
//!
//! #[derive(sqlx::FromRow)]
//! struct Order { id: i64, customer: String, total: f64 }
//!
//! impl_csv_record!(Order { "order_id" => id, "customer" => customer, "total" => total });
//!
//! let (body, receiver) = ChunkedBody::channel(4);
//! // hand `receiver.head` and `receiver.body` to the HTTP layer, then:
//! transfer_csv_chunked::<Order, _, _>(&pool, body, "SELECT id, customer, total FROM orders", "orders", 500).await?;
//! ```

// Public modules
pub mod domains;
pub mod errors;
pub mod globals;
pub mod validation;

pub use errors::{DbError, ExportError, ExportResult};

/// Initialize logging and the process-wide export configuration from the environment.
pub fn initialize() -> ExportResult<()> {
    globals::initialize()
}
