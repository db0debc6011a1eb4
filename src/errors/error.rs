use std::fmt;
use serde::Serialize;
use thiserror::Error;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Row decode error: {0}")]
    Decode(String),
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DbError", 2)?;
        let kind = match self {
            DbError::Sqlx(_) => "Sqlx",
            DbError::Transaction(_) => "Transaction",
            DbError::Query(_) => "Query",
            DbError::Decode(_) => "Decode",
        };
        state.serialize_field("type", kind)?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Errors raised while streaming a query result out as CSV.
///
/// Every variant aborts the export. Once a `Write` error happens part of the
/// body may already be on the wire, so it can only be logged, not turned into
/// a clean HTTP error response.
#[derive(Debug, Error, Serialize)]
pub enum ExportError {
    /// Transaction begin or cursor declaration failed.
    #[error("Failed to open cursor: {0}")]
    CursorOpen(DbError),

    /// Fetch statement or row decoding failed. The cursor position is undefined afterwards.
    #[error("Failed to fetch from cursor: {0}")]
    CursorFetch(DbError),

    /// Cursor close or commit failed.
    #[error("Failed to close cursor: {0}")]
    CursorClose(DbError),

    /// CSV serialization, stream write or flush failed.
    #[error("Write error: {0}")]
    Write(String),

    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Export cancelled: client disconnected")]
    Cancelled,
}

impl ExportError {
    /// True when body bytes may already have reached the client.
    pub fn may_have_partial_output(&self) -> bool {
        matches!(self, ExportError::Write(_) | ExportError::CursorFetch(_) | ExportError::Cancelled)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(error: std::io::Error) -> Self {
        ExportError::Write(error.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(error: csv::Error) -> Self {
        ExportError::Write(format!("CSV serialization failed: {}", error))
    }
}

impl From<ValidationError> for ExportError {
    fn from(error: ValidationError) -> Self {
        ExportError::InvalidConfig(error.to_string())
    }
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' must be between {min} and {max}")]
    Range {
        field: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn range<T: fmt::Display>(field: &str, min: T, max: T) -> Self {
        Self::Range {
            field: field.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExportError::CursorOpen(DbError::Query("syntax error at or near \"SELEC\"".to_string()));
        assert_eq!(
            err.to_string(),
            "Failed to open cursor: Query error: syntax error at or near \"SELEC\""
        );

        let err: ExportError = ValidationError::range("page_size", 1, 100_000).into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Field 'page_size' must be between 1 and 100000"
        );
    }

    #[test]
    fn test_partial_output_classification() {
        assert!(!ExportError::CursorOpen(DbError::Query("x".into())).may_have_partial_output());
        assert!(ExportError::CursorFetch(DbError::Decode("x".into())).may_have_partial_output());
        assert!(ExportError::Write("broken pipe".into()).may_have_partial_output());
        assert!(!ExportError::InvalidConfig("x".into()).may_have_partial_output());
    }

    #[test]
    fn test_db_error_serializes_with_type_tag() {
        let json = serde_json::to_value(DbError::Transaction("already committed".into())).unwrap();
        assert_eq!(json["type"], "Transaction");
        assert_eq!(json["message"], "Transaction error: already committed");
    }
}
