//! Round-rotated error log files
//!
//! A background task drains the [`PendingBuffer`](super::PendingBuffer) once
//! per interval and appends every record to the current round's file. Files
//! are opened lazily, so a round without errors leaves nothing on disk, and a
//! pending rotation closes the current file before the next batch is written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::controller::CaptureContext;
use crate::error::{CaptureError, Result};
use crate::record::ErrorRecord;

/// How often the writer drains the buffer
pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_secs(1);

const LOG_FILE_PREFIX: &str = "Error Log ";
const LOG_FILE_EXTENSION: &str = ".txt";

/// Upper bound on `(n)` suffixes tried before giving up on a file name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Delay between drain cycles
    pub interval: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WRITE_INTERVAL,
        }
    }
}

/// File name for a log created at `created_at`
///
/// `attempt` 1 is the plain name; later attempts add a ` (n)` suffix.
pub fn log_file_name(created_at: DateTime<Local>, attempt: u32) -> String {
    let stamp = created_at.format("%Y-%m-%d %H.%M.%S");
    if attempt <= 1 {
        format!("{}{}{}", LOG_FILE_PREFIX, stamp, LOG_FILE_EXTENSION)
    } else {
        format!("{}{} ({}){}", LOG_FILE_PREFIX, stamp, attempt, LOG_FILE_EXTENSION)
    }
}

/// Check whether a file name looks like one of ours
pub fn is_error_log_name(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_EXTENSION)
}

/// List error log files in a directory, sorted by name
pub fn list_log_files(log_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_error_log_name)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Format one record as a file block
///
/// The timestamp is the time of writing; records do not carry their own.
pub fn format_block(record: &ErrorRecord, written_at: DateTime<Local>) -> String {
    format!(
        "[{}] {}\n{}\n{}",
        written_at.format("%Y-%m-%d %H.%M.%S%.3f %:z"),
        record.header(),
        record.message,
        record.trace
    )
}

struct OpenLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OpenLog {
    fn create(log_dir: &Path) -> Result<Self> {
        let created_at = Local::now();

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let path = log_dir.join(log_file_name(created_at, attempt));
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!("Opened error log {}", path.display());
                    return Ok(Self {
                        path,
                        writer: BufWriter::new(file),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(CaptureError::OpenLog { path, source }),
            }
        }

        Err(CaptureError::OpenLog {
            path: log_dir.join(log_file_name(created_at, 1)),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "every candidate file name is taken",
            ),
        })
    }

    fn write_records(&mut self, batch: &[ErrorRecord]) -> Result<()> {
        for record in batch {
            writeln!(self.writer, "{}", format_block(record, Local::now())).map_err(|source| {
                CaptureError::Write {
                    path: self.path.clone(),
                    source,
                }
            })?;
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| CaptureError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Owns the current round's log file
///
/// At most one file is open at a time. Nothing else ever touches it.
pub struct LogRotator {
    log_dir: PathBuf,
    current: Option<OpenLog>,
}

impl LogRotator {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            current: None,
        }
    }

    /// Directory new files are created in
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the open file, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Close the current file so the next batch starts a new one
    pub fn rotate(&mut self) {
        if let Err(e) = self.close() {
            error!("{}", e.friendly_message());
        }
    }

    /// Flush and close the current file
    pub fn close(&mut self) -> Result<()> {
        match self.current.take() {
            Some(mut log) => {
                debug!("Closing error log {}", log.path.display());
                log.flush()
            }
            None => Ok(()),
        }
    }

    /// Append a batch to the current file, opening one if needed
    ///
    /// An empty batch never creates a file. A failed write drops the handle so
    /// the next batch gets a fresh file.
    pub fn write_batch(&mut self, batch: &[ErrorRecord]) -> Result<()> {
        if batch.is_empty() {
            return match self.current.as_mut() {
                Some(log) => log.flush(),
                None => Ok(()),
            };
        }

        if self.current.is_none() {
            self.current = Some(OpenLog::create(&self.log_dir)?);
        }
        let Some(log) = self.current.as_mut() else {
            return Ok(());
        };

        let result = log.write_records(batch);
        if result.is_err() {
            self.current = None;
        }
        result
    }

    /// One writer cycle: honor a pending rotation, then drain and write
    ///
    /// Failures are reported and the drained batch is dropped.
    pub fn run_cycle(&mut self, context: &CaptureContext) {
        if context.round.take_rotation() {
            debug!("New round, rotating error log");
            self.rotate();
        }

        let batch = context.buffer.drain_all();
        if let Err(e) = self.write_batch(&batch) {
            error!(dropped = batch.len(), "{}", e.friendly_message());
        }
    }
}

impl Drop for LogRotator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{}", e.friendly_message());
        }
    }
}

/// Handle to the running writer task
pub struct WriterHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WriterHandle {
    /// Check whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the writer and wait for its final drain to complete
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if the task already exited
            let _ = tx.send(());
        }

        if let Err(e) = self.task.await {
            error!("Error log writer task failed: {}", e);
        }
    }
}

/// Start the writer on the given runtime
pub fn spawn_writer(
    runtime: &Handle,
    context: Arc<CaptureContext>,
    log_dir: PathBuf,
    options: WriterOptions,
) -> WriterHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let rotator = LogRotator::new(log_dir);

    let task = runtime.spawn(run_writer(context, rotator, options, shutdown_rx));

    WriterHandle {
        shutdown_tx: Some(shutdown_tx),
        task,
    }
}

async fn run_writer(
    context: Arc<CaptureContext>,
    mut rotator: LogRotator,
    options: WriterOptions,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // tokio::time::interval panics on a zero period
    let period = options.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Error log writer started in {}", rotator.log_dir().display());

    loop {
        tokio::select! {
            // Also resolves when the handle is dropped without shutdown
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => rotator.run_cycle(&context),
        }
    }

    rotator.run_cycle(&context);
    if let Err(e) = rotator.close() {
        error!("{}", e.friendly_message());
    }

    info!("Error log writer stopped");
}
