//! Process-lifetime scratch directory for file-based test artifacts.
//!
//! One uniquely named directory is created under the system temp root at
//! setup and shared read-only by every test case in the run. Path derivation
//! is plain string concatenation against a stored directory string that
//! always ends in exactly one separator.
//!
//! Teardown is best effort by contract, not by accident:
//! - entries are removed depth-first, children before their directory,
//! - symbolic links are removed as entries and never followed,
//! - the walk does not cross mount-point boundaries,
//! - recursion is bounded by [`MAX_REMOVE_DEPTH`],
//! - every removal is attempted independently; failures are counted in the
//!   returned [`RemovalReport`] and never propagated. Callers needing strict
//!   cleanup guarantees must check the report themselves.

use std::fs;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use thiserror::Error;

use crate::runner::{HarnessError, TestEnvironment};

/// Maximum directory depth visited during teardown, counted from the scratch
/// root. Directories at the bound are not descended into; removing them fails
/// (and is counted) if they are non-empty.
pub const MAX_REMOVE_DEPTH: usize = 16;

/// Errors from scratch directory setup.
#[derive(Debug, Error)]
pub enum ScratchDirError {
    /// The unique directory could not be created under the temp root.
    #[error("failed to create scratch directory: {0}")]
    Create(#[from] io::Error),
}

/// Outcome of a best-effort recursive removal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Entries removed: files, symlinks, and directories.
    pub removed: usize,
    /// Entries whose removal was attempted and failed.
    pub failed: usize,
}

/// Uniquely named temporary directory shared by a whole test run.
///
/// Created once per process and torn down once after the last test case;
/// not designed for nested or concurrent instantiation.
pub struct ScratchDir {
    root: Option<PathBuf>,
    dir_string: String,
    created_at: Option<SystemTime>,
}

impl ScratchDir {
    /// Empty handle; the directory does not exist until [`Self::set_up`].
    pub fn new() -> Self {
        Self {
            root: None,
            dir_string: String::new(),
            created_at: None,
        }
    }

    /// Creates the scratch directory with a collision-resistant unique name.
    ///
    /// # Errors
    /// Fails if the directory cannot be created under the system temp root.
    pub fn set_up(&mut self) -> Result<(), ScratchDirError> {
        let dir = tempfile::Builder::new()
            .prefix("testkit.")
            .rand_bytes(8)
            .tempdir()?;

        // Teardown below owns removal; disarm tempfile's auto-delete.
        let root = dir.keep();

        let mut dir_string = root.to_string_lossy().into_owned();
        if !dir_string.ends_with(MAIN_SEPARATOR) {
            dir_string.push(MAIN_SEPARATOR);
        }

        self.root = Some(root);
        self.dir_string = dir_string;
        self.created_at = Some(SystemTime::now());
        Ok(())
    }

    /// Directory path as a string, with a trailing separator.
    ///
    /// Empty before `set_up`. The string is kept after `tear_down` so late
    /// diagnostics can still name the directory.
    pub fn temp_dir(&self) -> &str {
        &self.dir_string
    }

    /// Directory path, while the directory is live.
    pub fn path(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// When the directory was created.
    pub fn created_at(&self) -> Option<SystemTime> {
        self.created_at
    }

    /// Path for `name` inside the scratch directory.
    ///
    /// Exact concatenation: no existence check and no sanitization of `name`.
    /// `temp_filepath("x.bin")` equals `temp_dir()` + `"x.bin"` byte for byte.
    pub fn temp_filepath(&self, name: &str) -> String {
        let mut path = String::with_capacity(self.dir_string.len() + name.len());
        path.push_str(&self.dir_string);
        path.push_str(name);
        path
    }

    /// Removes the directory and everything under it, best effort.
    ///
    /// Safe to call without a prior `set_up` (reports nothing removed).
    pub fn tear_down(&mut self) -> RemovalReport {
        let mut report = RemovalReport::default();
        let Some(root) = self.root.take() else {
            return report;
        };

        let root_dev = match fs::symlink_metadata(&root) {
            Ok(meta) => device_of(&meta),
            Err(_) => {
                report.failed += 1;
                return report;
            }
        };

        remove_tree(&root, root_dev, 0, &mut report);
        report
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvironment for ScratchDir {
    fn set_up(&mut self) -> Result<(), HarnessError> {
        ScratchDir::set_up(self).map_err(HarnessError::from)
    }

    fn tear_down(&mut self) -> Result<(), HarnessError> {
        // Best effort by contract; the report is not an error.
        let _ = ScratchDir::tear_down(self);
        Ok(())
    }
}

/// Lets a scratch directory be registered as a global environment while test
/// cases keep a handle to read paths from it.
impl TestEnvironment for Arc<Mutex<ScratchDir>> {
    fn set_up(&mut self) -> Result<(), HarnessError> {
        let mut dir = self.lock().expect("scratch dir mutex poisoned");
        ScratchDir::set_up(&mut dir).map_err(HarnessError::from)
    }

    fn tear_down(&mut self) -> Result<(), HarnessError> {
        let mut dir = self.lock().expect("scratch dir mutex poisoned");
        let _ = ScratchDir::tear_down(&mut dir);
        Ok(())
    }
}

#[cfg(unix)]
fn device_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.dev()
}

#[cfg(not(unix))]
fn device_of(_meta: &fs::Metadata) -> u64 {
    0
}

/// Depth-first best-effort removal.
///
/// `symlink_metadata` keeps symlinks opaque: a link to a directory is treated
/// as a file and unlinked, never traversed.
fn remove_tree(path: &Path, root_dev: u64, depth: usize, report: &mut RemovalReport) {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => {
            report.failed += 1;
            return;
        }
    };

    if !meta.file_type().is_dir() {
        match fs::remove_file(path) {
            Ok(()) => report.removed += 1,
            Err(_) => report.failed += 1,
        }
        return;
    }

    if device_of(&meta) != root_dev {
        // Mount boundary: leave foreign filesystems untouched.
        return;
    }

    if depth < MAX_REMOVE_DEPTH {
        match fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(entry) => remove_tree(&entry.path(), root_dev, depth + 1, report),
                        Err(_) => report.failed += 1,
                    }
                }
            }
            Err(_) => report.failed += 1,
        }
    }

    // Children first; at the depth bound this fails on non-empty directories.
    match fs::remove_dir(path) {
        Ok(()) => report.removed += 1,
        Err(_) => report.failed += 1,
    }
}
