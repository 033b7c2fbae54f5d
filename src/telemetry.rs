use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::app::config::LoggingSettings;
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "taskgate.log";

/// Install the global subscriber. Logs always go to stderr, since stdout
/// carries command output, and additionally to a daily file when a log
/// directory is configured.
///
/// The returned guards flush the background writers when dropped and must
/// be held until the process exits.
pub fn init(settings: &LoggingSettings, debug: bool) -> Result<Vec<WorkerGuard>> {
    let filter = if debug {
        EnvFilter::try_new("taskgate=debug")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.filter))
    }
    .map_err(|e| Error::config(format!("Invalid log filter: {}", e)))?;

    let (stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let mut guards = vec![stderr_guard];

    let file_layer = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            guards.push(guard);
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(guards)
}
