//! Owned data types for the git background thread.
//!
//! All types in this module are fully owned and `Send` so they can cross from
//! the thread that owns the `git2::Repository` to async request handlers.

use revu_core::types::{FileStatus, Hunk};
use tokio::sync::oneshot;

/// One changed path relative to the base ref, with line stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// Repository-relative path.
    pub path: String,
    pub status: FileStatus,
    /// Number of lines added in this file.
    pub added: usize,
    /// Number of lines removed from this file.
    pub removed: usize,
}

/// Commands sent to the git worker thread.
///
/// Each request carries a oneshot sender; the worker replies exactly once.
/// Errors are flattened to strings because `git2::Error` stays on the worker.
#[derive(Debug)]
pub enum GitRequest {
    /// Working tree (including untracked files) against `base_ref`.
    ChangedFiles {
        base_ref: String,
        reply: oneshot::Sender<Result<Vec<ChangedFile>, String>>,
    },
    /// Unified diff hunks for one path against `base_ref`.
    FileDiff {
        path: String,
        base_ref: String,
        reply: oneshot::Sender<Result<Vec<Hunk>, String>>,
    },
    /// Shorthand name of the checked-out branch, if any.
    BranchName { reply: oneshot::Sender<Option<String>> },
}
