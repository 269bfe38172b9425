//! The agent-facing review file.
//!
//! A JSON document next to the reviewed files holding every live comment, the
//! content hash each comment set was written against, and round metadata. The
//! agent reads it after a finish, marks comments resolved in place, and the
//! round-completion transition reads the resolution state back.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{Comment, FileStatus};

/// Top-level shape of the review file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFile {
    #[serde(default)]
    pub session_id: String,
    #[serde(default = "first_round")]
    pub review_round: u32,
    #[serde(default)]
    pub base_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_token: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, ReviewFileEntry>,
}

/// Comments and content hash for one path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFileEntry {
    #[serde(default)]
    pub status: FileStatus,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

fn first_round() -> u32 {
    1
}

/// Hashes file bytes the way the review file records them.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Reads the review file at `path`.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns `ReviewError::Io` on read failure and `ReviewError::Json` when the
/// file is not a valid review file.
pub async fn load(path: &Path) -> Result<Option<ReviewFile>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

/// Writes `file` to `path` atomically (temp file + rename).
///
/// # Errors
///
/// Returns `ReviewError::Io` if the temp file cannot be written or renamed.
pub async fn save(path: &Path, file: &ReviewFile) -> Result<()> {
    let json = serde_json::to_vec_pretty(file)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Deletes the review file; a missing file is not an error.
pub async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Drops resolution lines that the agent wrote but that cannot be anchored.
///
/// A resolved comment keeps `resolution_lines` only when the list is non-empty
/// and every line exists in content of `line_count` lines. Unresolved comments
/// never carry resolution lines.
pub fn sanitize_resolution(comments: &mut [Comment], line_count: Option<usize>) {
    for c in comments.iter_mut() {
        let keep = match (&c.resolution_lines, line_count) {
            (Some(lines), _) if !c.resolved || lines.is_empty() => false,
            (Some(lines), Some(count)) => {
                lines.iter().all(|&l| l >= 1 && (l as usize) <= count)
            }
            (Some(_), None) => true,
            (None, _) => true,
        };
        if !keep {
            c.resolution_lines = None;
        }
    }
}
