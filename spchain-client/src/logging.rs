use anyhow::Context;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    prelude::*,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "spchain_core=debug,spchain_transport=debug,spchain_client=debug,warn";

/// Initialize logging with console output and a daily-rotated log file.
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(log_dir: impl AsRef<Path>, log_prefix: &str) -> anyhow::Result<()> {
    let log_dir_path = log_dir.as_ref();

    std::fs::create_dir_all(log_dir_path)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir_path))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(log_prefix)
        .build(log_dir_path)
        .context("Failed to create rolling log file")?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    // the writer flushes for as long as the guard lives
    std::mem::forget(guard);

    tracing::info!("Logging initialized with file output to {:?}", log_dir_path);
    Ok(())
}

/// Console-only logging for tests; safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spchain_core=trace,debug")),
        )
        .with_test_writer()
        .try_init();
}
