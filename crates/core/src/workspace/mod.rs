//! Per-job temporary files.
//!
//! A [`Workspace`] binds the three paths one job needs (raw input, normalized
//! clip, packaged note) inside a directory named after the job id. The
//! directory is created exclusively, so two live workspaces can never share a
//! path. [`WorkspaceManager::release`] consumes the workspace and removes
//! every bound path once; a workspace dropped without release (panic, task
//! abort) cleans up from `Drop` instead.

mod fs;

pub use fs::{StdFs, WorkspaceFs};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics;
use crate::pipeline::JobId;

const INPUT_FILE: &str = "input.mp4";
const NORMALIZED_FILE: &str = "normalized.mp4";
const PACKAGED_FILE: &str = "note.mp4";

/// Workspace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory under which per-job directories are created.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("roundnote")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

/// Errors from acquiring a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Another live workspace already owns this job id.
    #[error("workspace already exists for job {0}")]
    Collision(String),

    /// The job id cannot be used as a directory name.
    #[error("invalid workspace id: {0:?}")]
    InvalidId(String),

    /// The directory could not be created.
    #[error("failed to create workspace at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of tearing a workspace down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths that existed and were removed.
    pub removed: usize,
    /// Paths that were never created.
    pub missing: usize,
    /// Paths whose removal failed (logged, not propagated).
    pub failed: usize,
}

impl CleanupReport {
    /// Whether every path is now gone.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Temporary paths exclusively owned by one job.
pub struct Workspace {
    job_id: JobId,
    dir: PathBuf,
    input: PathBuf,
    normalized: PathBuf,
    packaged: PathBuf,
    fs: Arc<dyn WorkspaceFs>,
    released: bool,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("job_id", &self.job_id)
            .field("dir", &self.dir)
            .field("released", &self.released)
            .finish()
    }
}

impl Workspace {
    /// The job this workspace belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Directory holding all of this job's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the fetched upload is written.
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Where the normalized square clip is written.
    pub fn normalized_path(&self) -> &Path {
        &self.normalized
    }

    /// Where the final video note is written.
    pub fn packaged_path(&self) -> &Path {
        &self.packaged
    }

    /// All bound file paths, in pipeline order.
    pub fn paths(&self) -> [&Path; 3] {
        [&self.input, &self.normalized, &self.packaged]
    }

    fn teardown(&mut self) -> CleanupReport {
        self.released = true;
        let mut report = CleanupReport::default();

        for path in [&self.input, &self.normalized, &self.packaged] {
            match self.fs.remove_file(path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::CLEANUP_FAILURES.inc();
                    warn!(job_id = %self.job_id, path = %path.display(), "Failed to remove temp file: {}", e);
                }
            }
        }

        match self.fs.remove_dir(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                report.failed += 1;
                metrics::CLEANUP_FAILURES.inc();
                warn!(job_id = %self.job_id, dir = %self.dir.display(), "Failed to remove workspace dir: {}", e);
            }
        }

        debug!(
            job_id = %self.job_id,
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            "Workspace released"
        );
        report
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            warn!(job_id = %self.job_id, "Workspace dropped without release, cleaning up");
            self.teardown();
        }
    }
}

/// Allocates and tears down workspaces.
pub struct WorkspaceManager {
    config: WorkspaceConfig,
    fs: Arc<dyn WorkspaceFs>,
}

impl WorkspaceManager {
    /// Creates a manager on the real file system.
    pub fn new(config: WorkspaceConfig) -> Self {
        Self::with_fs(config, Arc::new(StdFs))
    }

    /// Creates a manager on an injected file system.
    pub fn with_fs(config: WorkspaceConfig, fs: Arc<dyn WorkspaceFs>) -> Self {
        Self { config, fs }
    }

    /// Root directory for all workspaces.
    pub fn root(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Allocates the workspace for `job_id`.
    pub fn acquire(&self, job_id: &JobId) -> Result<Workspace, WorkspaceError> {
        let token = job_id.as_str();
        if token.is_empty()
            || !token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(WorkspaceError::InvalidId(token.to_string()));
        }

        let root = &self.config.temp_dir;
        self.fs
            .create_dir_all(root)
            .map_err(|source| WorkspaceError::Io {
                path: root.clone(),
                source,
            })?;

        let dir = root.join(token);
        self.fs.create_dir(&dir).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                WorkspaceError::Collision(token.to_string())
            } else {
                WorkspaceError::Io {
                    path: dir.clone(),
                    source,
                }
            }
        })?;

        debug!(job_id = %job_id, dir = %dir.display(), "Workspace acquired");

        Ok(Workspace {
            job_id: job_id.clone(),
            input: dir.join(INPUT_FILE),
            normalized: dir.join(NORMALIZED_FILE),
            packaged: dir.join(PACKAGED_FILE),
            dir,
            fs: Arc::clone(&self.fs),
            released: false,
        })
    }

    /// Removes every path bound in `workspace`. Never fails; problems are
    /// logged and reported.
    pub fn release(&self, mut workspace: Workspace) -> CleanupReport {
        let report = workspace.teardown();
        debug!(
            job_id = %workspace.job_id(),
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            "Workspace released"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;
    use tempfile::TempDir;

    fn manager_on(temp: &TempDir) -> WorkspaceManager {
        WorkspaceManager::new(WorkspaceConfig {
            temp_dir: temp.path().join("work"),
        })
    }

    #[test]
    fn test_acquire_binds_three_paths_under_job_dir() {
        let temp = TempDir::new().unwrap();
        let manager = manager_on(&temp);
        let job_id = JobId::from_media_ref("AgADBAADfile");

        let ws = manager.acquire(&job_id).unwrap();
        assert!(ws.dir().is_dir());
        for path in ws.paths() {
            assert!(path.starts_with(ws.dir()));
            assert!(path.to_string_lossy().contains(job_id.as_str()));
        }
        assert_ne!(ws.input_path(), ws.normalized_path());
        assert_ne!(ws.normalized_path(), ws.packaged_path());

        manager.release(ws);
    }

    #[test]
    fn test_release_removes_created_and_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let manager = manager_on(&temp);
        let ws = manager.acquire(&JobId::from_media_ref("media")).unwrap();

        std::fs::write(ws.input_path(), b"raw").unwrap();
        std::fs::write(ws.normalized_path(), b"clip").unwrap();
        let dir = ws.dir().to_path_buf();
        let paths: Vec<PathBuf> = ws.paths().iter().map(|p| p.to_path_buf()).collect();

        let report = manager.release(ws);
        assert_eq!(
            report,
            CleanupReport {
                removed: 2,
                missing: 1,
                failed: 0
            }
        );
        assert!(report.is_clean());
        for path in paths {
            assert!(!path.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_same_id_collides_while_live() {
        let temp = TempDir::new().unwrap();
        let manager = manager_on(&temp);
        let job_id = JobId::from_media_ref("media");

        let ws = manager.acquire(&job_id).unwrap();
        let err = manager.acquire(&job_id).unwrap_err();
        assert!(matches!(err, WorkspaceError::Collision(_)));

        manager.release(ws);
        let again = manager.acquire(&job_id).unwrap();
        manager.release(again);
    }

    #[test]
    fn test_same_media_ref_gets_distinct_workspaces() {
        let temp = TempDir::new().unwrap();
        let manager = manager_on(&temp);

        let a = manager.acquire(&JobId::from_media_ref("same")).unwrap();
        let b = manager.acquire(&JobId::from_media_ref("same")).unwrap();
        assert_ne!(a.dir(), b.dir());

        manager.release(a);
        manager.release(b);
    }

    #[test]
    fn test_invalid_id_rejected() {
        let temp = TempDir::new().unwrap();
        let manager = manager_on(&temp);
        let err = manager.acquire(&JobId::new("../escape")).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidId(_)));
    }

    #[test]
    fn test_each_path_removed_exactly_once() {
        let fs = Arc::new(MemoryFs::new());
        let manager = WorkspaceManager::with_fs(WorkspaceConfig::default(), fs.clone());
        let ws = manager.acquire(&JobId::new("job-1")).unwrap();
        let paths: Vec<PathBuf> = ws.paths().iter().map(|p| p.to_path_buf()).collect();
        fs.touch(ws.input_path());

        manager.release(ws);

        for path in &paths {
            assert_eq!(fs.removal_attempts(path), 1, "{}", path.display());
        }
        assert!(fs.live_files().is_empty());
    }

    #[test]
    fn test_removal_failure_is_reported_not_propagated() {
        let fs = Arc::new(MemoryFs::new());
        let manager = WorkspaceManager::with_fs(WorkspaceConfig::default(), fs.clone());
        let ws = manager.acquire(&JobId::new("job-2")).unwrap();
        fs.touch(ws.normalized_path());
        fs.fail_removal_of(ws.normalized_path());

        let report = manager.release(ws);
        assert_eq!(report.failed, 2); // the file, then its non-empty dir
        assert!(!report.is_clean());
    }

    #[test]
    fn test_drop_without_release_cleans_up_once() {
        let fs = Arc::new(MemoryFs::new());
        let manager = WorkspaceManager::with_fs(WorkspaceConfig::default(), fs.clone());
        let ws = manager.acquire(&JobId::new("job-3")).unwrap();
        let input = ws.input_path().to_path_buf();
        fs.touch(&input);

        drop(ws);

        assert_eq!(fs.removal_attempts(&input), 1);
        assert!(fs.live_files().is_empty());
    }
}
