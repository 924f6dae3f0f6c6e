use crate::infrastructure::error::InfraError;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "studyaid.log";

/// Installs the global subscriber: daily-rotated JSON lines under `log_dir`.
/// `RUST_LOG` wins over the configured level.
pub fn init(log_dir: &Path, level: &str) -> Result<LoggingGuard, InfraError> {
    std::fs::create_dir_all(log_dir)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(level)?,
    };

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("logging already initialized: {error}")))?;

    tracing::info!(log_dir = %log_dir.display(), level, "logging initialized");
    Ok(LoggingGuard { _guard: guard })
}

fn configured_filter(level: &str) -> Result<EnvFilter, InfraError> {
    EnvFilter::try_new(level)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid logLevel '{level}': {error}")))
}

pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}
