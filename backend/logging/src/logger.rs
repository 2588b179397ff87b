//! Structured Logger
//!
//! Wraps `tracing` to provide a console layer, JSON file rotation (NDJSON),
//! a separate stream for security events, and environment-based level control.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::event_logger::SECURITY_TARGET;

/// Initialize the global structured logger.
///
/// Console output, `warden.log.YYYY-MM-DD` for everything, and
/// `security-events.log.YYYY-MM-DD` for the `security_events` target only.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str) {
    let log_dir = log_dir.as_ref();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "warden.log");
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let security_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "security-events.log");
    let security_layer = fmt::layer()
        .json()
        .with_writer(security_appender)
        .with_ansi(false)
        .with_filter(filter_fn(|meta| meta.target() == SECURITY_TARGET));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(security_layer)
        .try_init();
}
