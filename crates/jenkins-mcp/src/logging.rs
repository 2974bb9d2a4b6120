//! Tracing setup. Logs always go to stderr because stdout carries JSON-RPC.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Create a non-blocking writer appending to `path`.
///
/// The returned guard flushes pending lines on drop and must be kept alive
/// for as long as logging is needed.
pub(crate) fn create_file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("Log path has no file name: {}", path.display()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber. Filtering follows `RUST_LOG`.
pub(crate) fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    match log_file {
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .ok();
            Ok(None)
        }
        Some(path) => {
            let (file_writer, guard) = create_file_writer(path)?;
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr.and(file_writer))
                .with_ansi(false)
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .ok();
            Ok(Some(guard))
        }
    }
}
