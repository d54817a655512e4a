use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogSettings;
use crate::error::{CliError, Result};

/// Prefix of the daily log files written to `--log-dir`.
const LOG_FILE_PREFIX: &str = "pgxfer.log";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set. The
/// returned guard flushes the file writer and must live until exit.
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(settings.level.as_filter().into()));

    let (file_layer, guard) = match settings.dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                CliError::Logging(format!("cannot create log directory {}: {e}", dir.display()))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(guard)
}
