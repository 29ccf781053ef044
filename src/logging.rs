use std::fs::OpenOptions;
use std::io;
use std::panic;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::constants::DEFAULT_LOG_FILTER;

/// Installs the global subscriber, appending to `log_file`.
///
/// Logging is best-effort: when the file cannot be opened, events are discarded
/// and the process carries on.
pub fn init(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let writer = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => BoxMakeWriter::new(Arc::new(file)),
        Err(_) => BoxMakeWriter::new(io::sink),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
}

pub fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
