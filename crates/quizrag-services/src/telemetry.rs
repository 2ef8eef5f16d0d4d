//! Tracing bootstrap

use quizrag_config::LoggingSettings;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{ServiceError, ServiceResult};

/// Build the filter for `settings`: the explicit directive wins over `level`
pub fn env_filter(settings: &LoggingSettings) -> ServiceResult<EnvFilter> {
    let directive = settings
        .filter
        .as_deref()
        .unwrap_or(settings.level.as_str())
        .trim()
        .to_lowercase();
    let directive = if directive.is_empty() {
        "info".to_string()
    } else {
        directive
    };
    EnvFilter::try_new(&directive).map_err(|e| ServiceError::LogFilter {
        directive,
        message: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed.
pub fn init_tracing(settings: &LoggingSettings) -> ServiceResult<bool> {
    let filter = env_filter(settings)?;
    let installed = fmt()
        .with_env_filter(filter)
        .with_target(settings.debug)
        .with_thread_ids(settings.debug)
        .with_file(settings.debug)
        .with_line_number(settings.debug)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    Ok(installed)
}
