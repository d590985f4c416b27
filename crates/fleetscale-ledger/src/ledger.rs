//! HistoryLedger — loads, appends to, and atomically persists the history
//! document.
//!
//! Single writer assumed: two concurrent checks would both read the same
//! document and the later rename wins.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::entry::{CheckEntry, NewCheck};
use crate::error::{LedgerError, LedgerResult};
use crate::history::History;

#[derive(Debug, Clone)]
pub struct HistoryLedger {
    path: PathBuf,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted history.
    ///
    /// Never fails: a missing document is an empty history, and an
    /// unreadable or corrupt one is logged, copied aside to `<name>.corrupt`
    /// and also treated as empty.
    pub fn load(&self) -> History {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no history yet");
                return History::new();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "history unreadable, starting empty");
                return History::new();
            }
        };

        let parsed = serde_json::from_slice(&content)
            .map_err(LedgerError::from)
            .and_then(History::from_value);
        match parsed {
            Ok(history) => {
                debug!(checks = history.len(), path = ?self.path, "history loaded");
                history
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "history corrupt, starting empty");
                let backup = sibling(&self.path, ".corrupt");
                if let Err(e) = fs::write(&backup, &content) {
                    warn!(path = ?backup, error = %e, "failed to keep corrupt history copy");
                }
                History::new()
            }
        }
    }

    /// Record a check: assign the next check number, diff membership against
    /// the previous check, and persist the whole document.
    ///
    /// `history` is only updated once the write has succeeded.
    pub fn append(&self, history: &mut History, check: NewCheck) -> LedgerResult<CheckEntry> {
        let check_number = history.next_check_number();
        let previous_active = history.active_at(check_number - 1);
        let entry = check.into_entry(check_number, previous_active.as_ref());

        let mut updated = history.clone();
        updated.insert(&entry)?;
        self.persist(&updated)?;
        *history = updated;

        info!(
            check = check_number,
            action = %entry.decision,
            active = entry.active.len(),
            started = entry.started.len(),
            shutdown = entry.shutdown.len(),
            "check recorded"
        );
        Ok(entry)
    }

    /// Atomically replace the document: write a temporary sibling, flush it
    /// to disk, rename over the original, then flush the directory entry.
    pub fn persist(&self, history: &History) -> LedgerResult<()> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| LedgerError::Io { path, source }
        };

        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        history.serialize(&mut ser)?;
        buf.push(b'\n');

        let tmp = sibling(&self.path, ".tmp");
        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(&buf).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        if let Some(parent) = parent {
            sync_dir(parent).map_err(io_err(parent))?;
        }
        debug!(path = ?self.path, bytes = buf.len(), "history persisted");
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `podStatus.json` → `podStatus.json<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
