//! Archiver — moves consumed sample files out of the results directory.
//!
//! Archiving is idempotent: a file that is already gone (moved by an
//! earlier, interrupted check) is counted and skipped.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use fleetscale_core::config::SamplesConfig;

use crate::error::{SampleError, SampleResult};
use crate::store::SampleFile;

/// Outcome of one archive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub moved: usize,
    pub already_archived: usize,
    pub skipped_reserved: usize,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    archive_dir: PathBuf,
    reserved: String,
}

impl Archiver {
    pub fn new(archive_dir: impl Into<PathBuf>, reserved: impl Into<String>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            reserved: reserved.into(),
        }
    }

    pub fn from_config(config: &SamplesConfig) -> Self {
        Self::new(config.archive_dir(), config.history_file.clone())
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Move each file into the archive directory, keeping its name.
    pub fn archive(&self, files: &[SampleFile]) -> SampleResult<ArchiveReport> {
        let mut report = ArchiveReport::default();
        if files.is_empty() {
            return Ok(report);
        }

        std::fs::create_dir_all(&self.archive_dir).map_err(|source| SampleError::Archive {
            path: self.archive_dir.clone(),
            source,
        })?;

        for file in files {
            if file.file_name == self.reserved {
                report.skipped_reserved += 1;
                continue;
            }

            let dest = self.archive_dir.join(&file.file_name);
            match move_file(&file.path, &dest) {
                Ok(()) => report.moved += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %file.file_name, "already archived");
                    report.already_archived += 1;
                }
                Err(source) => {
                    return Err(SampleError::Archive {
                        path: file.path.clone(),
                        source,
                    });
                }
            }
        }

        info!(
            moved = report.moved,
            already_archived = report.already_archived,
            dir = ?self.archive_dir,
            "samples archived"
        );
        Ok(report)
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match std::fs::rename(src, dest) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)
        }
        other => other,
    }
}
