//! Error log persistence
//!
//! Buffers captured errors, writes them to one file per round, and optionally
//! prunes old files. Also sets up the process's own `tracing` output, which is
//! where every failure in this crate gets reported.

mod buffer;
mod file_writer;
mod retention;

pub use buffer::PendingBuffer;
pub use file_writer::{
    format_block, is_error_log_name, list_log_files, log_file_name, spawn_writer, LogRotator,
    WriterHandle, WriterOptions, DEFAULT_WRITE_INTERVAL,
};
pub use retention::cleanup_old_logs;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the process-wide `tracing` subscriber
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `error_catcher=info`).
/// Returns an error if a subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "error_catcher=info".into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
