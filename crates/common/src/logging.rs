//! Tracing subscriber setup.

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Failure installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("failed to create log directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Keeps the background file writer alive. Drop it only at process exit,
/// otherwise buffered lines are lost.
#[must_use = "dropping the guard stops the file writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `filter`. Human-readable
/// output goes to stdout; if `log_dir` is given, JSON lines are also written
/// to a daily-rolling `quant-bot.log.<date>` file in that directory.
pub fn init_logging(filter: &str, log_dir: Option<&Path>) -> Result<LoggingGuard, LoggingError> {
    let build_filter = || -> Result<EnvFilter, LoggingError> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(from_env) if !from_env.trim().is_empty() => Ok(EnvFilter::new(from_env)),
            _ => EnvFilter::try_new(filter).map_err(|e| LoggingError::Filter {
                filter: filter.to_string(),
                reason: e.to_string(),
            }),
        }
    };

    let stdout_layer = fmt::layer().with_target(false).with_filter(build_filter()?);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(stdout_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
        return Ok(LoggingGuard { _file: None });
    };

    std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
        path: dir.display().to_string(),
        source,
    })?;

    let appender = tracing_appender::rolling::daily(dir, "quant-bot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .with_filter(build_filter()?);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    Ok(LoggingGuard { _file: Some(guard) })
}
