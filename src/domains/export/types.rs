use crate::errors::ValidationResult;
use crate::validation::{validate_cursor_name, Validate, ValidationBuilder};
use serde::{Deserialize, Serialize};

/// Cursor name used when none is configured. Shared by every export, so two
/// exports must never run inside the same transaction scope.
pub const DEFAULT_CURSOR_NAME: &str = "csv_export_cursor";

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Upper bound on rows per fetch.
pub const MAX_PAGE_SIZE: usize = 100_000;

/// Record terminator for emitted CSV lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    pub(crate) fn to_csv(self) -> csv::Terminator {
        match self {
            LineTerminator::Lf => csv::Terminator::Any(b'\n'),
            LineTerminator::CrLf => csv::Terminator::CRLF,
        }
    }
}

/// Settings for one chunked CSV export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows requested per `FETCH`; bounds memory held per page.
    pub page_size: usize,
    pub cursor_name: String,
    /// Prefix the body with the UTF-8 byte-order mark.
    pub write_bom: bool,
    /// Send `Content-Description: File Transfer`.
    pub content_description: bool,
    pub line_terminator: LineTerminator,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cursor_name: DEFAULT_CURSOR_NAME.to_string(),
            write_bom: true,
            content_description: true,
            line_terminator: LineTerminator::Lf,
        }
    }
}

impl ExportConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cursor_name(mut self, cursor_name: impl Into<String>) -> Self {
        self.cursor_name = cursor_name.into();
        self
    }

    /// Build a config from `CSV_EXPORT_*` environment variables, loading `.env` first.
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("CSV_EXPORT_PAGE_SIZE") {
            match value.trim().parse::<usize>() {
                Ok(page_size) => config.page_size = page_size,
                Err(_) => log::warn!("Ignoring invalid CSV_EXPORT_PAGE_SIZE: {}", value),
            }
        }
        if let Some(value) = lookup("CSV_EXPORT_CURSOR_NAME") {
            config.cursor_name = value.trim().to_string();
        }
        if let Some(flag) = lookup("CSV_EXPORT_WRITE_BOM").and_then(|v| parse_flag(&v)) {
            config.write_bom = flag;
        }
        if let Some(flag) = lookup("CSV_EXPORT_CONTENT_DESCRIPTION").and_then(|v| parse_flag(&v)) {
            config.content_description = flag;
        }
        if let Some(flag) = lookup("CSV_EXPORT_CRLF").and_then(|v| parse_flag(&v)) {
            config.line_terminator = if flag { LineTerminator::CrLf } else { LineTerminator::Lf };
        }

        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Ignoring invalid boolean flag: {}", value);
            None
        }
    }
}

impl Validate for ExportConfig {
    fn validate(&self) -> ValidationResult<()> {
        ValidationBuilder::new("page_size", Some(self.page_size))
            .range(1, MAX_PAGE_SIZE)
            .validate()?;
        validate_cursor_name(&self.cursor_name)
    }
}

/// Lifecycle of one export. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportState {
    Init,
    HeaderSent,
    Streaming,
    Done,
    Aborted,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportState::Done | ExportState::Aborted)
    }
}

/// Export statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub rows_written: usize,
    pub pages_fetched: usize,
    pub bytes_written: usize,
    pub flushes: usize,
    pub duration_ms: u64,
}
