//! Tracing Setup
//!
//! Builds the subscriber from [`LoggingConfig`]: env-filter level, optional
//! rolling file appender, optional JSON output. Returns the appender guard,
//! which must be held for the life of the process or buffered log lines are
//! lost on exit.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    let Some(dir) = &config.dir else {
        // No log directory configured: stdout only.
        registry.with(fmt::layer().with_target(false)).init();
        return None;
    };

    let appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(dir, &config.file),
        "daily" => tracing_appender::rolling::daily(dir, &config.file),
        _ => tracing_appender::rolling::never(dir, &config.file),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    Some(guard)
}
