//! Background thread that owns git2::Repository for its lifetime.
//!
//! git2::Repository is !Send — it must be opened inside the thread, not passed in.
//! All communication is via channels: GitRequest in, oneshot replies out.

use std::cell::RefCell;
use std::path::Path;

use crossbeam_channel::Receiver;
use git2::{Delta, Diff, DiffOptions, Repository};
use revu_core::types::{DiffLine, DiffLineKind, FileStatus, Hunk};
use tracing::debug;

use crate::git::types::{ChangedFile, GitRequest};

/// Entry point for the background thread that owns the git Repository.
///
/// Opens the Repository at `path`, reports the outcome on `ready`, then loops
/// over incoming `GitRequest` messages until the channel is closed (all
/// senders dropped).
pub fn git_worker_loop(
    path: String,
    rx: Receiver<GitRequest>,
    ready: crossbeam_channel::Sender<Result<String, String>>,
) {
    let repo = match Repository::discover(&path) {
        Ok(r) => r,
        Err(e) => {
            let _ = ready.send(Err(e.message().to_owned()));
            return;
        }
    };
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| Path::new(&path))
        .to_string_lossy()
        .into_owned();
    let _ = ready.send(Ok(workdir));

    for request in rx {
        handle_request(&repo, request);
    }
    debug!("git worker exiting");
}

/// Dispatches a GitRequest to the matching git2 operation and replies.
///
/// A dropped reply receiver (caller gave up) is ignored.
fn handle_request(repo: &Repository, request: GitRequest) {
    match request {
        GitRequest::ChangedFiles { base_ref, reply } => {
            let result = workdir_diff(repo, &base_ref, None)
                .map(|diff| extract_files(&diff))
                .map_err(|e| e.message().to_owned());
            let _ = reply.send(result);
        }
        GitRequest::FileDiff { path, base_ref, reply } => {
            let result = workdir_diff(repo, &base_ref, Some(&path))
                .map(|diff| extract_hunks(&diff))
                .map_err(|e| e.message().to_owned());
            let _ = reply.send(result);
        }
        GitRequest::BranchName { reply } => {
            let name = repo
                .head()
                .ok()
                .and_then(|h| h.shorthand().map(str::to_owned));
            let _ = reply.send(name);
        }
    }
}

/// Diffs the tree at `base_ref` against the working directory (through the index).
///
/// An unborn branch (no commits yet) diffs against the empty tree. Untracked
/// files are included with their content so they appear as pure additions.
fn workdir_diff<'a>(
    repo: &'a Repository,
    base_ref: &str,
    pathspec: Option<&str>,
) -> Result<Diff<'a>, git2::Error> {
    let base_tree = match repo.revparse_single(base_ref) {
        Ok(obj) => Some(obj.peel_to_tree()?),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound => {
            None
        }
        Err(e) => return Err(e),
    };

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    if let Some(path) = pathspec {
        opts.pathspec(path).disable_pathspec_match(true);
    }
    repo.diff_tree_to_workdir_with_index(base_tree.as_ref(), Some(&mut opts))
}

/// Collects per-file status and added/removed line counts from diff deltas.
///
/// The `file_cb` callback fires once per delta in order, so `files.last_mut()`
/// in the line callback always refers to the current file.
fn extract_files(diff: &Diff<'_>) -> Vec<ChangedFile> {
    let files: RefCell<Vec<ChangedFile>> = RefCell::new(Vec::new());

    let _ = diff.foreach(
        &mut |delta, _progress| {
            let file = if delta.status() == Delta::Deleted { delta.old_file() } else { delta.new_file() };
            let path = file
                .path()
                .unwrap_or(Path::new("unknown"))
                .to_string_lossy()
                .into_owned();
            let status = match delta.status() {
                Delta::Added => FileStatus::Added,
                Delta::Deleted => FileStatus::Deleted,
                Delta::Untracked => FileStatus::Untracked,
                _ => FileStatus::Modified,
            };
            files.borrow_mut().push(ChangedFile { path, status, added: 0, removed: 0 });
            true
        },
        None,
        None,
        Some(&mut |_delta, _hunk, line| {
            let mut files = files.borrow_mut();
            if let Some(f) = files.last_mut() {
                match line.origin() {
                    '+' => f.added += 1,
                    '-' => f.removed += 1,
                    _ => {}
                }
            }
            true
        }),
    );

    files.into_inner()
}

/// Walks diff hunks and lines, converting to owned types for cross-thread transfer.
///
/// RefCell lets the hunk and line closures share the hunk list; git2 runs both
/// sequentially on this thread. Origins other than `+`, `-` and context (the
/// end-of-file markers) are skipped.
fn extract_hunks(diff: &Diff<'_>) -> Vec<Hunk> {
    let hunks: RefCell<Vec<Hunk>> = RefCell::new(Vec::new());

    let _ = diff.foreach(
        &mut |_delta, _progress| true,
        None,
        Some(&mut |_delta, hunk| {
            hunks.borrow_mut().push(Hunk {
                old_start: hunk.old_start(),
                old_count: hunk.old_lines(),
                new_start: hunk.new_start(),
                new_count: hunk.new_lines(),
                header: String::from_utf8_lossy(hunk.header()).trim_end().to_owned(),
                lines: Vec::new(),
            });
            true
        }),
        Some(&mut |_delta, _hunk, line| {
            let kind = match line.origin() {
                '+' => DiffLineKind::Add,
                '-' => DiffLineKind::Del,
                ' ' => DiffLineKind::Context,
                _ => return true,
            };
            let content = String::from_utf8_lossy(line.content())
                .trim_end_matches('\n')
                .to_owned();
            if let Some(h) = hunks.borrow_mut().last_mut() {
                h.lines.push(DiffLine {
                    kind,
                    content,
                    old_num: line.old_lineno(),
                    new_num: line.new_lineno(),
                });
            }
            true
        }),
    );

    hunks.into_inner()
}
