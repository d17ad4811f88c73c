//! Error log retention
//!
//! Optional cleanup of old round files in an instance's log directory.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;

use super::file_writer::list_log_files;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Delete error logs older than the specified number of days
///
/// Only files named like `Error Log <timestamp>.txt` are considered. A period
/// too long to represent keeps everything. Returns the number of files deleted.
pub fn cleanup_old_logs(logs_dir: &Path, retention_days: u64) -> Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }

    let Some(retention_secs) = retention_days.checked_mul(SECS_PER_DAY) else {
        return Ok(0);
    };
    let retention_duration = Duration::from_secs(retention_secs);
    let cutoff = SystemTime::now()
        .checked_sub(retention_duration)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted_count = 0;

    for path in list_log_files(logs_dir)? {
        if let Ok(metadata) = fs::metadata(&path) {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff && fs::remove_file(&path).is_ok() {
                    deleted_count += 1;
                }
            }
        }
    }

    Ok(deleted_count)
}
