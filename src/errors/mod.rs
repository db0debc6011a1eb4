mod error;

pub use error::{DbError, ExportError, ValidationError};

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;
