//! Structured Logger
//!
//! Wraps `tracing` with an `EnvFilter`, a console layer and, when a log
//! directory is given, a daily-rolling NDJSON file layer.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the non-blocking file writer alive; drop it on shutdown to flush.
pub struct LoggerGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global logger.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless:
/// the second registry is simply not installed.
pub fn init_logger(log_dir: Option<&Path>, level: &str) -> LoggerGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true)
        .boxed();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            // Writes NDJSON to `actguard.log.YYYY-MM-DD`
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "actguard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    LoggerGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        let _first = init_logger(None, "debug");
        let _second = init_logger(None, "info");
        tracing::info!("logger initialised");
    }
}
