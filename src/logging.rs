//! Tracing subscriber setup: env filter, stdout, and optional daily-rotated log files.

use crate::config::Settings;
use crate::error::ConfigError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "crud-scaffold.log";
pub const MAX_LOG_FILES: usize = 28;

/// Install the global subscriber. Keep the returned guard alive so buffered file output is flushed.
pub fn init(settings: &Settings) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_new(&settings.log_filter)
        .map_err(|e| ConfigError::Validation(format!("RUST_LOG: {}", e)))?;

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .max_log_files(MAX_LOG_FILES)
                .build(dir)
                .map_err(|e| ConfigError::Load(format!("log dir {}: {}", dir.display(), e)))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Validation(format!("logging already initialised: {}", e)))?;
    Ok(guard)
}
