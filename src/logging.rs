use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::constants::{DEFAULT_LOG_FILTER, LOG_DIR, LOG_FILE_PREFIX};

/// Initializes logging: human-readable output on stderr (stdout may carry the
/// CSV) plus JSON lines in a daily-rotated file under `logs/`.
///
/// Keep the returned guard alive for the life of the program, or buffered file
/// logs are lost on exit.
pub fn init_logging() -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // File logging is best effort; a read-only working directory should not stop a run.
    if fs::create_dir_all(LOG_DIR).is_err() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer())
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer())
        .init();

    Some(guard)
}

fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_target(true).with_writer(std::io::stderr)
}
