//! Git integration module.
//!
//! Provides the revision identifier injected into images, charts and docs
//! deploys, and the clean-working-tree precondition.

use std::path::{Path, PathBuf};

use git2::{Repository, Status, StatusOptions};
use tracing::debug;

use crate::core::{OrchestratorError, Result};

/// Length of the abbreviated commit id used as the revision.
pub const REVISION_LENGTH: usize = 12;

/// Summary of uncommitted changes in a work tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Number of staged changes
    pub staged_count: usize,

    /// Number of unstaged changes
    pub unstaged_count: usize,

    /// Number of untracked files
    pub untracked_count: usize,

    /// A few of the affected paths, for error messages
    pub sample_paths: Vec<String>,
}

impl WorktreeStatus {
    /// Check whether there are no changes at all.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.staged_count == 0 && self.unstaged_count == 0 && self.untracked_count == 0
    }

    /// Compact description, e.g. `1 staged, 2 unstaged (src/a.rs, README.md)`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.staged_count > 0 {
            parts.push(format!("{} staged", self.staged_count));
        }
        if self.unstaged_count > 0 {
            parts.push(format!("{} unstaged", self.unstaged_count));
        }
        if self.untracked_count > 0 {
            parts.push(format!("{} untracked", self.untracked_count));
        }

        let mut summary = parts.join(", ");
        if !self.sample_paths.is_empty() {
            summary.push_str(&format!(" ({})", self.sample_paths.join(", ")));
        }
        summary
    }
}

/// Git repository wrapper with the operations the orchestrator needs.
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the Git repository containing the given path.
    ///
    /// This will search up the directory tree to find a Git repository.
    #[must_use]
    pub fn discover(path: impl AsRef<Path>) -> Option<Self> {
        Repository::discover(path.as_ref()).ok().map(|repo| Self { repo })
    }

    /// Get the repository root path (None for bare repositories).
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    /// Abbreviated id of the commit at HEAD.
    pub fn revision(&self) -> Result<String> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        let mut id = commit.id().to_string();
        id.truncate(REVISION_LENGTH);
        Ok(id)
    }

    /// Get the work tree status, ignoring files covered by `.gitignore`.
    pub fn worktree_status(&self) -> Result<WorktreeStatus> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false)
            .include_unmodified(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut status = WorktreeStatus::default();

        for entry in statuses.iter() {
            let s = entry.status();

            if s.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE,
            ) {
                status.staged_count += 1;
            }

            if s.intersects(
                Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_RENAMED | Status::WT_TYPECHANGE,
            ) {
                status.unstaged_count += 1;
            }

            if s.contains(Status::WT_NEW) {
                status.untracked_count += 1;
            }

            if status.sample_paths.len() < 3 {
                if let Some(path) = entry.path() {
                    status.sample_paths.push(path.to_string());
                }
            }
        }

        Ok(status)
    }
}

/// Resolve the revision for a project directory.
///
/// Fails with `ConfigurationMissing` when the directory is not inside a
/// repository or HEAD does not point at a commit yet.
pub fn head_revision(project_dir: &Path) -> Result<String> {
    let repo = GitRepository::discover(project_dir).ok_or_else(|| {
        OrchestratorError::missing("REVISION", "not inside a git repository")
    })?;

    repo.revision().map_err(|e| {
        debug!("Cannot read HEAD: {}", e);
        OrchestratorError::missing("REVISION", "HEAD has no commit")
    })
}

/// Fail with `WorkspaceNotClean` unless the work tree has no changes.
pub fn ensure_clean(project_dir: &Path) -> Result<()> {
    let repo = GitRepository::discover(project_dir).ok_or_else(|| {
        OrchestratorError::WorkspaceNotClean(format!(
            "{} is not inside a git work tree",
            project_dir.display()
        ))
    })?;

    let status = repo.worktree_status()?;
    if status.is_clean() {
        Ok(())
    } else {
        Err(OrchestratorError::WorkspaceNotClean(status.summary()))
    }
}
