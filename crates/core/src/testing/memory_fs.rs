//! In-memory workspace file system for testing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::workspace::WorkspaceFs;

#[derive(Debug, Default)]
struct State {
    dirs: HashSet<PathBuf>,
    files: BTreeSet<PathBuf>,
    removal_attempts: HashMap<PathBuf, usize>,
    failing: HashSet<PathBuf>,
}

/// [`WorkspaceFs`] that keeps everything in memory.
///
/// Counts removal attempts per path and can be told to fail removing a
/// specific path.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<State>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or keeps) a file at `path`.
    pub fn touch(&self, path: &Path) {
        self.state().files.insert(path.to_path_buf());
    }

    /// Makes every removal of `path` fail with `PermissionDenied`.
    pub fn fail_removal_of(&self, path: &Path) {
        self.state().failing.insert(path.to_path_buf());
    }

    /// How often removal of `path` was attempted.
    pub fn removal_attempts(&self, path: &Path) -> usize {
        self.state()
            .removal_attempts
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Files that currently exist.
    pub fn live_files(&self) -> Vec<PathBuf> {
        self.state().files.iter().cloned().collect()
    }

    /// Whether a directory currently exists.
    pub fn dir_exists(&self, path: &Path) -> bool {
        self.state().dirs.contains(path)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkspaceFs for MemoryFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        for ancestor in path.ancestors() {
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        if state.dirs.contains(path) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !state.dirs.contains(parent) {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        *state.removal_attempts.entry(path.to_path_buf()).or_default() += 1;
        if state.failing.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if state.files.remove(path) {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        *state.removal_attempts.entry(path.to_path_buf()).or_default() += 1;
        if state.failing.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if state.files.iter().any(|file| file.starts_with(path)) {
            return Err(io::Error::from(io::ErrorKind::DirectoryNotEmpty));
        }
        if state.dirs.remove(path) {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }
}
