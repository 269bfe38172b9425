use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A review session row in the metadata database.
///
/// Sessions are keyed by UUID v4 text. Each unique combination of `repo_path`
/// and `base_ref` produces a separate session on first launch; subsequent
/// launches resume the most-recent matching session and its round counter.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,           // UUID v4 text
    pub repo_path: String,
    pub base_ref: String,
    pub round: u32,
    pub last_round_edits: u32,
    pub share_url: Option<String>,
    pub delete_token: Option<String>,
    pub created_at: i64,      // Unix timestamp seconds
    pub updated_at: i64,      // Unix timestamp seconds
}

/// One completed round as recorded in the `rounds` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub edit_count: u32,
    pub comment_count: u32,
    pub completed_at: i64,
}

/// Which version's line numbering a comment is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Old,
    New,
}

/// A review comment on a line range of one tracked file.
///
/// `start_line..=end_line` is 1-indexed and inclusive. The resolution fields are
/// written by the agent into the review file and read back at round completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_lines: Option<Vec<u32>>,
}

/// Change status of a tracked file relative to the base ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    #[default]
    Modified,
    Deleted,
    Untracked,
}

/// How a tracked file is reviewed.
///
/// `Document` files keep their content in memory and are diffed round over
/// round; `Code` files are read from disk and diffed by the git collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Code,
}

impl FileKind {
    /// Classifies a repository-relative path by extension.
    pub fn for_path(path: &str) -> Self {
        let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md" | "markdown" | "txt") => FileKind::Document,
            _ => FileKind::Code,
        }
    }
}

/// A file supplied at startup by the caller (usually the git collaborator).
#[derive(Debug, Clone)]
pub struct TrackedFile {
    pub path: String,
    pub status: FileStatus,
    pub kind: FileKind,
    pub added: usize,
    pub removed: usize,
}

impl TrackedFile {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        let path = path.into();
        let kind = FileKind::for_path(&path);
        Self { path, status, kind, added: 0, removed: 0 }
    }
}

/// Per-file listing row returned by [`crate::session::Session::files`].
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub status: FileStatus,
    pub kind: FileKind,
    pub added: usize,
    pub removed: usize,
    pub comment_count: usize,
    pub unresolved_count: usize,
    pub stale: bool,
}

/// Session metadata plus per-file summaries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub round: u32,
    pub branch: Option<String>,
    pub base_ref: String,
    pub pending_edits: u32,
    pub last_round_edits: u32,
    pub share_url: Option<String>,
    pub review_file: String,
    pub files: Vec<FileSummary>,
}

/// Current content of one file as seen by a viewer.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub kind: FileKind,
    pub content: Option<String>,
    pub stale: bool,
}

/// Round-over-round view of a document file.
#[derive(Debug, Clone, Serialize)]
pub struct RoundDiff {
    pub path: String,
    pub round: u32,
    pub entries: Vec<DiffEntry>,
    pub previous_comments: Vec<Comment>,
}

/// One line of [`crate::diff::compute_line_diff`] output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiffEntry {
    Unchanged { text: String, old_line: usize, new_line: usize },
    Added { text: String, new_line: usize },
    Removed { text: String, old_line: usize },
}

impl DiffEntry {
    pub fn text(&self) -> &str {
        match self {
            DiffEntry::Unchanged { text, .. }
            | DiffEntry::Added { text, .. }
            | DiffEntry::Removed { text, .. } => text,
        }
    }

    pub fn old_line(&self) -> Option<usize> {
        match self {
            DiffEntry::Unchanged { old_line, .. } | DiffEntry::Removed { old_line, .. } => {
                Some(*old_line)
            }
            DiffEntry::Added { .. } => None,
        }
    }

    pub fn new_line(&self) -> Option<usize> {
        match self {
            DiffEntry::Unchanged { new_line, .. } | DiffEntry::Added { new_line, .. } => {
                Some(*new_line)
            }
            DiffEntry::Removed { .. } => None,
        }
    }
}

/// A diff hunk produced by the git collaborator for code files.
#[derive(Debug, Clone, Serialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub header: String,
    pub lines: Vec<DiffLine>,
}

/// A single line within a diff hunk with change type.
#[derive(Debug, Clone, Serialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: DiffLineKind,
    pub content: String,
    pub old_num: Option<u32>,
    pub new_num: Option<u32>,
}

/// The type of change for a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Add,
    Del,
    Context,
}

/// Prompt produced by the finish action and handed to a waiting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewPrompt {
    pub prompt: String,
    pub review_file: String,
}

/// Result of [`crate::session::Session::finish`].
#[derive(Debug, Clone, Serialize)]
pub struct FinishOutcome {
    pub prompt: String,
    pub review_file: String,
    pub agent_notified: bool,
}

/// Events pushed to every connected viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    /// A file changed on disk during the current round.
    EditDetected { edit_count: u32 },
    /// A round completed; viewers should refetch the listed files.
    FileChanged { round: u32, last_round_edits: u32, paths: Vec<String> },
    /// The server is going away; the mailbox closes after this event.
    ServerShutdown,
}

impl ReviewEvent {
    /// Stable event name used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            ReviewEvent::EditDetected { .. } => "edit_detected",
            ReviewEvent::FileChanged { .. } => "file_changed",
            ReviewEvent::ServerShutdown => "server_shutdown",
        }
    }
}
