//! Work-directory cleanup between annex runs
//!
//! Sweeps intermediate files out of the working directory so consecutive
//! annexes never see each other's leftovers. Locked files (still held by a
//! viewer or a slow antivirus pass) are skipped and reported rather than
//! failing the sweep.

use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of one cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed: usize,
    pub locked_skipped: usize,
    pub failed: usize,
}

impl CleanupSummary {
    pub fn is_clean(&self) -> bool {
        self.locked_skipped == 0 && self.failed == 0
    }
}

/// Remove every regular file directly under `dir`.
///
/// A missing directory is a no-op, not an error. Subdirectories are left in
/// place; the pipeline only ever writes flat files into the work dir.
pub fn clean_workdir(dir: impl AsRef<Path>) -> io::Result<CleanupSummary> {
    let dir = dir.as_ref();
    let mut summary = CleanupSummary::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(summary),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => summary.removed += 1,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "file locked, skipping removal");
                summary.locked_skipped += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove work file");
                summary.failed += 1;
            }
        }
    }

    info!(
        removed = summary.removed,
        locked = summary.locked_skipped,
        failed = summary.failed,
        "work directory sweep complete"
    );
    Ok(summary)
}
