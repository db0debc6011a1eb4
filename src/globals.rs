use crate::domains::export::types::ExportConfig;
use crate::errors::ExportResult;
use crate::validation::Validate;
use std::sync::OnceLock;

static EXPORT_CONFIG: OnceLock<ExportConfig> = OnceLock::new();

/// Set up logging and load the export configuration from the environment.
/// Safe to call more than once; only the first successful call takes effect.
pub fn initialize() -> ExportResult<()> {
    initialize_with(ExportConfig::from_env())
}

/// Like [`initialize`], with an explicit configuration.
pub fn initialize_with(config: ExportConfig) -> ExportResult<()> {
    init_logging();

    config.validate()?;
    log::debug!(
        "Export config: page_size={}, cursor={}, bom={}, terminator={:?}",
        config.page_size,
        config.cursor_name,
        config.write_bom,
        config.line_terminator
    );

    if EXPORT_CONFIG.set(config).is_err() {
        log::debug!("Export config already initialized, keeping the existing one");
    }
    Ok(())
}

fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        #[cfg(debug_assertions)]
        std::env::set_var("RUST_LOG", "debug");
        #[cfg(not(debug_assertions))]
        std::env::set_var("RUST_LOG", "info");
    }

    // Initialize env_logger if not already initialized
    let _ = env_logger::try_init();
}

/// Process-wide export config, or the defaults when `initialize` was never called.
pub fn export_config() -> ExportConfig {
    EXPORT_CONFIG.get().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ExportConfig::default().with_page_size(0);
        assert!(initialize_with(config).is_err());
    }

    #[test]
    fn test_export_config_always_available() {
        assert!(export_config().validate().is_ok());
    }
}
