//! File synchronization with rollback bookkeeping
//!
//! Writes are compare-before-write: a file is only touched when its desired
//! content or mode differs from what is on disk, and the prior state is
//! captured first so a failed multi-file pass can be unwound. There is no
//! cross-file atomicity; single-file granularity is all the underlying
//! filesystem guarantees.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Mode for newly created unit files
pub const UNIT_FILE_MODE: u32 = 0o644;

/// Snapshot of one file: its content and permission bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFileState {
    pub content: Vec<u8>,
    pub mode: u32,
}

impl UnitFileState {
    /// Write this snapshot back to `path`
    pub fn restore(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.content)?;
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
    }
}

/// Synchronize one file with its desired content.
///
/// Returns the state of the file before the call (`None` if it did not
/// exist) and whether anything was written. A pre-existing file keeps its
/// current mode unless `mode` explicitly overrides it; new files get `mode`
/// or [`UNIT_FILE_MODE`].
pub fn sync_unit_file(
    path: &Path,
    desired: &[u8],
    mode: Option<u32>,
) -> io::Result<(Option<UnitFileState>, bool)> {
    // snapshot before any modification, so there is something to roll
    // back to
    let prior = match fs::metadata(path) {
        Ok(meta) => Some(UnitFileState {
            content: fs::read(path)?,
            mode: meta.permissions().mode() & 0o7777,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let target_mode = match (&prior, mode) {
        (_, Some(m)) => m,
        (Some(prev), None) => prev.mode,
        (None, None) => UNIT_FILE_MODE,
    };

    if let Some(prev) = &prior {
        if prev.content == desired && prev.mode == target_mode {
            return Ok((prior, false));
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, desired)?;
    fs::set_permissions(path, fs::Permissions::from_mode(target_mode))?;
    Ok((prior, true))
}

/// The set of files modified by one reconciliation pass, with the state to
/// roll each back to.
///
/// A path is recorded at most once, keeping the first prior state observed,
/// so repeated writes to the same path roll back to the original content
/// rather than an intermediate. Exactly one of [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) must be called; dropping an unresolved
/// transaction is logged as a bug.
#[derive(Debug, Default)]
pub struct UnitTransaction {
    modified: BTreeMap<PathBuf, Option<UnitFileState>>,
    resolved: bool,
}

impl UnitTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a modification and the state it should roll back to
    pub fn record(&mut self, path: PathBuf, prior: Option<UnitFileState>) {
        self.modified.entry(path).or_insert(prior);
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len()
    }

    /// Keep all modifications
    pub fn commit(mut self) {
        self.resolved = true;
    }

    /// Best-effort restore of every recorded path to its prior state.
    ///
    /// Files that did not exist before are removed. Failures do not abort
    /// the remaining restores; they are returned so the caller can report
    /// them.
    pub fn rollback(mut self) -> Vec<(PathBuf, io::Error)> {
        self.resolved = true;

        let mut failures = Vec::new();
        for (path, prior) in std::mem::take(&mut self.modified) {
            let result = match &prior {
                Some(state) => state.restore(&path),
                None => match fs::remove_file(&path) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                    _ => Ok(()),
                },
            };
            if let Err(e) = result {
                failures.push((path, e));
            }
        }
        failures
    }
}

impl Drop for UnitTransaction {
    fn drop(&mut self) {
        if !self.resolved && !self.modified.is_empty() {
            log::error!(
                "unit transaction dropped with {} modified files neither committed nor rolled back",
                self.modified.len()
            );
        }
    }
}
