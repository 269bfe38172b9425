//! The review session aggregate.
//!
//! One [`Session`] owns every tracked file, its comments and round snapshots
//! behind a single reader/writer lock. Reads return copies; no lock is held
//! across I/O. Round transitions live in [`crate::round`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;
use tracing::{info, warn};

use crate::broadcast::{Broadcaster, Subscription};
use crate::db;
use crate::diff::compute_line_diff;
use crate::error::{Result, ReviewError};
use crate::rendezvous::Rendezvous;
use crate::review_file::{self, ReviewFile, ReviewFileEntry};
use crate::types::{
    Comment, FileContent, FileKind, FileStatus, FileSummary, RoundDiff, RoundRecord, SessionInfo,
    Side, TrackedFile,
};

/// Tunables for one session; the binary fills these from its config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory tracked paths are relative to.
    pub repo_root: PathBuf,
    /// Review file name, relative to `repo_root`.
    pub review_file: PathBuf,
    pub base_ref: String,
    pub branch: Option<String>,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub mailbox_capacity: usize,
    /// Command the agent runs to signal that its edits are done.
    pub advance_command: String,
}

impl SessionOptions {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            review_file: PathBuf::from(".revu.json"),
            base_ref: "HEAD".to_owned(),
            branch: None,
            poll_interval: Duration::from_secs(1),
            debounce: Duration::from_millis(500),
            mailbox_capacity: 64,
            advance_command: "revu go".to_owned(),
        }
    }
}

/// One tracked file inside the session lock.
#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub path: String,
    pub status: FileStatus,
    pub kind: FileKind,
    pub added: usize,
    pub removed: usize,
    /// In-memory content; `None` for code files, which are read from disk.
    pub content: Option<String>,
    pub content_hash: String,
    pub next_comment_id: u64,
    pub comments: Vec<Comment>,
    pub previous_content: Option<String>,
    pub previous_comments: Vec<Comment>,
    /// Set by the first edit of a round, cleared when the round completes.
    pub snapshot_taken: bool,
    pub stale: bool,
}

impl FileEntry {
    fn new(file: TrackedFile, bytes: &[u8]) -> Self {
        let content = match file.kind {
            FileKind::Document => Some(String::from_utf8_lossy(bytes).into_owned()),
            FileKind::Code => None,
        };
        Self {
            path: file.path,
            status: file.status,
            kind: file.kind,
            added: file.added,
            removed: file.removed,
            content,
            content_hash: review_file::content_hash(bytes),
            next_comment_id: 1,
            comments: Vec::new(),
            previous_content: None,
            previous_comments: Vec::new(),
            snapshot_taken: false,
            stale: false,
        }
    }

    /// Restores comments from the review file, flagging a hash mismatch as stale.
    fn restore(&mut self, persisted: ReviewFileEntry) {
        self.stale = !persisted.content_hash.is_empty() && persisted.content_hash != self.content_hash;
        self.next_comment_id = persisted.comments.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        self.comments = persisted.comments;
    }

    pub(crate) fn line_count(&self) -> Option<usize> {
        self.content.as_deref().map(|c| if c.is_empty() { 0 } else { c.split('\n').count() })
    }

    fn summary(&self) -> FileSummary {
        FileSummary {
            path: self.path.clone(),
            status: self.status,
            kind: self.kind,
            added: self.added,
            removed: self.removed,
            comment_count: self.comments.len(),
            unresolved_count: self.comments.iter().filter(|c| !c.resolved).count(),
            stale: self.stale,
        }
    }
}

/// Mutable state guarded by the session lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub files: Vec<FileEntry>,
    pub round: u32,
    pub pending_edits: u32,
    pub last_round_edits: u32,
    pub share_url: Option<String>,
    pub delete_token: Option<String>,
    /// True between a finish that handed comments to the agent and the next
    /// round completion; the agent owns the review file meanwhile.
    pub handoff_pending: bool,
}

impl SessionState {
    pub(crate) fn file(&self, path: &str) -> Result<&FileEntry> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .ok_or_else(|| ReviewError::UnknownFile(path.to_owned()))
    }

    pub(crate) fn file_mut(&mut self, path: &str) -> Result<&mut FileEntry> {
        self.files
            .iter_mut()
            .find(|f| f.path == path)
            .ok_or_else(|| ReviewError::UnknownFile(path.to_owned()))
    }

    pub(crate) fn comment_count(&self) -> usize {
        self.files.iter().map(|f| f.comments.len()).sum()
    }
}

/// A review session shared by the HTTP handlers and background tasks.
pub struct Session {
    pub(crate) id: String,
    pub(crate) options: SessionOptions,
    pub(crate) state: RwLock<SessionState>,
    pub(crate) events: Broadcaster,
    pub(crate) rendezvous: Rendezvous,
    pub(crate) db: Option<Connection>,
    round_tx: mpsc::Sender<()>,
    round_rx: Mutex<Option<mpsc::Receiver<()>>>,
    save_tx: mpsc::Sender<()>,
    save_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Session {
    /// Builds a session over `files`, reading their current content from disk.
    ///
    /// With a metadata database the most recent session for this repository
    /// and base ref is resumed (id, round counter, share reference); an
    /// existing review file restores comments and may advance the round.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Db` if the session row cannot be read or created.
    /// An unreadable review file is logged and ignored.
    pub async fn open(
        options: SessionOptions,
        files: Vec<TrackedFile>,
        db: Option<Connection>,
    ) -> Result<Arc<Self>> {
        let record = match &db {
            Some(conn) => {
                let repo = options.repo_root.to_string_lossy().into_owned();
                Some(db::detect_or_create_session(conn, &repo, &options.base_ref).await?)
            }
            None => None,
        };

        let mut entries: Vec<FileEntry> = Vec::with_capacity(files.len());
        for file in files {
            if entries.iter().any(|e| e.path == file.path) {
                continue;
            }
            let bytes = read_or_empty(&options.repo_root.join(&file.path)).await;
            entries.push(FileEntry::new(file, &bytes));
        }

        let review_path = options.repo_root.join(&options.review_file);
        let persisted = match review_file::load(&review_path).await {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %review_path.display(), error = %e, "ignoring unreadable review file");
                None
            }
        };

        let mut state = SessionState {
            files: entries,
            round: 1,
            pending_edits: 0,
            last_round_edits: 0,
            share_url: None,
            delete_token: None,
            handoff_pending: false,
        };
        if let Some(record) = &record {
            state.round = record.round.max(1);
            state.last_round_edits = record.last_round_edits;
            state.share_url = record.share_url.clone();
            state.delete_token = record.delete_token.clone();
        }
        if let Some(mut persisted) = persisted {
            state.round = state.round.max(persisted.review_round);
            if state.share_url.is_none() {
                state.share_url = persisted.share_url.take();
                state.delete_token = persisted.delete_token.take();
            }
            for entry in state.files.iter_mut() {
                if let Some(p) = persisted.files.remove(&entry.path) {
                    entry.restore(p);
                    if entry.stale {
                        warn!(path = %entry.path, "persisted comments were written against different content");
                    }
                }
            }
        }

        let id = record.map(|r| r.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        info!(session = %id, round = state.round, files = state.files.len(), "review session ready");

        let (round_tx, round_rx) = mpsc::channel(1);
        let (save_tx, save_rx) = mpsc::channel(1);
        let events = Broadcaster::new(options.mailbox_capacity);
        Ok(Arc::new(Self {
            id,
            options,
            state: RwLock::new(state),
            events,
            rendezvous: Rendezvous::new(),
            db,
            round_tx,
            round_rx: Mutex::new(Some(round_rx)),
            save_tx,
            save_rx: Mutex::new(Some(save_rx)),
        }))
    }

    /// Spawns the file watcher and the debounced persister.
    ///
    /// Both stop when `shutdown` flips to `true`. Calling this twice spawns nothing
    /// the second time.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(rx) = self.round_rx.lock().take() {
            handles.push(crate::watcher::spawn_watcher(Arc::clone(self), rx, shutdown.clone()));
        }
        if let Some(rx) = self.save_rx.lock().take() {
            handles.push(crate::persist::spawn_persister(Arc::clone(self), rx, shutdown));
        }
        handles
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Absolute path of the review file.
    pub fn review_file_path(&self) -> PathBuf {
        self.options.repo_root.join(&self.options.review_file)
    }

    pub fn round(&self) -> u32 {
        self.state.read().round
    }

    pub fn pending_edits(&self) -> u32 {
        self.state.read().pending_edits
    }

    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Registers a live-event mailbox for one viewer.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Adds a comment on `start_line..=end_line` of `path`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty body or a bad range, `UnknownFile` for an
    /// untracked path.
    pub fn add_comment(
        &self,
        path: &str,
        start_line: u32,
        end_line: u32,
        body: &str,
        side: Option<Side>,
    ) -> Result<Comment> {
        if start_line == 0 || start_line > end_line {
            return Err(ReviewError::InvalidInput(format!(
                "invalid line range {start_line}-{end_line}"
            )));
        }
        if body.trim().is_empty() {
            return Err(ReviewError::InvalidInput("comment body is empty".to_owned()));
        }

        let comment = {
            let mut state = self.state.write();
            let entry = state.file_mut(path)?;
            let now = Utc::now();
            let comment = Comment {
                id: entry.next_comment_id,
                start_line,
                end_line,
                side,
                body: body.to_owned(),
                created_at: now,
                updated_at: now,
                resolved: false,
                resolution_note: None,
                resolution_lines: None,
            };
            entry.next_comment_id += 1;
            entry.comments.push(comment.clone());
            comment
        };
        self.schedule_save();
        Ok(comment)
    }

    /// Replaces the body of comment `id` on `path`.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path, `NotFound` when no such comment exists.
    pub fn update_comment(&self, path: &str, id: u64, body: &str) -> Result<Comment> {
        if body.trim().is_empty() {
            return Err(ReviewError::InvalidInput("comment body is empty".to_owned()));
        }
        let comment = {
            let mut state = self.state.write();
            let entry = state.file_mut(path)?;
            let comment = entry
                .comments
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| ReviewError::NotFound { path: path.to_owned(), id })?;
            comment.body = body.to_owned();
            comment.updated_at = Utc::now();
            comment.clone()
        };
        self.schedule_save();
        Ok(comment)
    }

    /// Deletes comment `id`; returns `false` when it did not exist.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path.
    pub fn delete_comment(&self, path: &str, id: u64) -> Result<bool> {
        let removed = {
            let mut state = self.state.write();
            let entry = state.file_mut(path)?;
            let before = entry.comments.len();
            entry.comments.retain(|c| c.id != id);
            entry.comments.len() != before
        };
        if removed {
            self.schedule_save();
        }
        Ok(removed)
    }

    /// Returns a copy of the live comments on `path`.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path.
    pub fn list_comments(&self, path: &str) -> Result<Vec<Comment>> {
        Ok(self.state.read().file(path)?.comments.clone())
    }

    /// Removes every live comment on every file; returns how many were removed.
    pub fn clear_all_comments(&self) -> usize {
        let removed = {
            let mut state = self.state.write();
            let removed = state.comment_count();
            for entry in state.files.iter_mut() {
                entry.comments.clear();
            }
            removed
        };
        if removed > 0 {
            self.schedule_save();
        }
        removed
    }

    /// Total live comments across all files.
    pub fn comment_count(&self) -> usize {
        self.state.read().comment_count()
    }

    /// Per-file listing in tracking order.
    pub fn files(&self) -> Vec<FileSummary> {
        self.state.read().files.iter().map(FileEntry::summary).collect()
    }

    /// Session metadata plus the file listing.
    pub fn info(&self) -> SessionInfo {
        let state = self.state.read();
        SessionInfo {
            session_id: self.id.clone(),
            round: state.round,
            branch: self.options.branch.clone(),
            base_ref: self.options.base_ref.clone(),
            pending_edits: state.pending_edits,
            last_round_edits: state.last_round_edits,
            share_url: state.share_url.clone(),
            review_file: self.review_file_path().display().to_string(),
            files: state.files.iter().map(FileEntry::summary).collect(),
        }
    }

    /// Tracked kind of `path`.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path.
    pub fn file_kind(&self, path: &str) -> Result<FileKind> {
        Ok(self.state.read().file(path)?.kind)
    }

    /// Current content of `path` (`None` for code files).
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path.
    pub fn file_content(&self, path: &str) -> Result<FileContent> {
        let state = self.state.read();
        let entry = state.file(path)?;
        Ok(FileContent {
            path: entry.path.clone(),
            kind: entry.kind,
            content: entry.content.clone(),
            stale: entry.stale,
        })
    }

    /// Round-over-round diff of a document file.
    ///
    /// Before any snapshot exists the current content is diffed against
    /// itself, so every line is `Unchanged`.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path, `InvalidInput` for a code file
    /// (those are diffed by git).
    pub fn file_diff(&self, path: &str) -> Result<RoundDiff> {
        let (current, previous, previous_comments, round) = {
            let state = self.state.read();
            let entry = state.file(path)?;
            let Some(current) = entry.content.clone() else {
                return Err(ReviewError::InvalidInput(format!("{path} is not a document")));
            };
            (current, entry.previous_content.clone(), entry.previous_comments.clone(), state.round)
        };
        let previous = previous.unwrap_or_else(|| current.clone());
        Ok(RoundDiff {
            path: path.to_owned(),
            round,
            entries: compute_line_diff(&previous, &current),
            previous_comments,
        })
    }

    /// Records a share reference and its delete token.
    pub async fn set_share(&self, url: String, delete_token: Option<String>) {
        {
            let mut state = self.state.write();
            state.share_url = Some(url.clone());
            state.delete_token = delete_token.clone();
        }
        self.persist_share(Some(url), delete_token).await;
        self.schedule_save();
    }

    /// Forgets the share reference; returns the delete token that was held.
    pub async fn clear_share(&self) -> Option<String> {
        let token = {
            let mut state = self.state.write();
            state.share_url = None;
            state.delete_token.take()
        };
        self.persist_share(None, None).await;
        self.schedule_save();
        token
    }

    async fn persist_share(&self, url: Option<String>, token: Option<String>) {
        if let Some(conn) = &self.db {
            if let Err(e) = db::update_share(conn, &self.id, url, token).await {
                warn!(error = %e, "failed to store share reference");
            }
        }
    }

    /// Completed rounds recorded in the metadata database.
    ///
    /// # Errors
    ///
    /// `Db` if the query fails; an empty list without a database.
    pub async fn rounds(&self) -> Result<Vec<RoundRecord>> {
        match &self.db {
            Some(conn) => Ok(db::load_rounds(conn, &self.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Queues the external round-complete signal.
    ///
    /// Returns `false` when a signal is already pending; the two coalesce
    /// into a single round transition.
    pub fn signal_round_complete(&self) -> bool {
        match self.round_tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                info!("round-complete signal already pending, coalesced");
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Requests a debounced write of the review file.
    pub(crate) fn schedule_save(&self) {
        // A full channel already has a save pending.
        let _ = self.save_tx.try_send(());
    }

    /// Copies the persistable state out of the lock.
    pub(crate) fn snapshot_review_file(&self) -> ReviewFile {
        let state = self.state.read();
        ReviewFile {
            session_id: self.id.clone(),
            review_round: state.round,
            base_ref: self.options.base_ref.clone(),
            updated_at: Some(Utc::now()),
            share_url: state.share_url.clone(),
            delete_token: state.delete_token.clone(),
            files: state
                .files
                .iter()
                .map(|f| {
                    (
                        f.path.clone(),
                        ReviewFileEntry {
                            status: f.status,
                            content_hash: f.content_hash.clone(),
                            comments: f.comments.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Writes the review file unless the agent currently owns it.
    ///
    /// Returns `true` when a write happened.
    ///
    /// # Errors
    ///
    /// `Io`/`Json` when the write fails; the caller logs and retries later.
    pub async fn save_review_file(&self) -> Result<bool> {
        if self.state.read().handoff_pending {
            return Ok(false);
        }
        let snapshot = self.snapshot_review_file();
        review_file::save(&self.review_file_path(), &snapshot).await?;
        Ok(true)
    }

    /// Broadcasts `ServerShutdown`, closes every viewer mailbox and releases
    /// a parked agent.
    pub fn shutdown(&self) {
        self.events.shutdown();
        self.rendezvous.close();
    }
}

async fn read_or_empty(path: &Path) -> Vec<u8> {
    match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot read tracked file");
            }
            Vec::new()
        }
    }
}
