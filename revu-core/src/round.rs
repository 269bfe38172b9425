//! Round lifecycle: edit detection, round completion and the finish action.
//!
//! ```text
//! Reviewing(n) --edit--> EditsPending(n) --edit--> EditsPending(n)
//!      |                       |
//!      +------ round complete -+--> Reviewing(n + 1)
//! ```
//!
//! The first edit of a round snapshots the file; later edits in the same round
//! only replace the current content, so the round diff spans the whole round.

use tracing::{info, warn};

use crate::db;
use crate::error::{Result, ReviewError};
use crate::review_file;
use crate::session::Session;
use crate::types::{FileKind, FinishOutcome, ReviewEvent, ReviewPrompt};

impl Session {
    /// Applies one observed disk change to `path`.
    ///
    /// `content` is the new text for document files (ignored for code files);
    /// `hash` is the content hash of the new bytes. Returns the running edit
    /// count, or `None` when the hash matches what is already recorded.
    ///
    /// # Errors
    ///
    /// `UnknownFile` for an untracked path.
    pub fn record_edit(&self, path: &str, content: Option<String>, hash: String) -> Result<Option<u32>> {
        let count = {
            let mut state = self.state.write();
            let entry = state.file_mut(path)?;
            if entry.content_hash == hash {
                return Ok(None);
            }
            if !entry.snapshot_taken {
                entry.previous_content = entry.content.clone();
                entry.previous_comments = entry.comments.clone();
                entry.snapshot_taken = true;
            }
            entry.content_hash = hash;
            if entry.kind == FileKind::Document {
                entry.content = Some(content.unwrap_or_default());
                entry.comments.clear();
                entry.next_comment_id = 1;
            }
            entry.stale = false;
            state.pending_edits += 1;
            state.pending_edits
        };
        info!(path, edit_count = count, "edit detected");
        self.events.publish(ReviewEvent::EditDetected { edit_count: count });
        Ok(Some(count))
    }

    /// Advances the session to the next round.
    ///
    /// Loads the agent's resolution state from the review file into the
    /// previous-round comments, removes the review file, bumps the round and
    /// notifies viewers. Returns the new round number.
    ///
    /// Storage problems (unreadable annotations, a failed metadata write) are
    /// logged and do not stop the transition.
    pub async fn complete_round(&self) -> u32 {
        let review_path = self.review_file_path();
        let mut annotations = match review_file::load(&review_path).await {
            Ok(file) => file.map(|f| f.files).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "cannot read agent annotations, keeping live snapshot");
                Default::default()
            }
        };

        let (completed, round, edits, comment_count, paths) = {
            let mut state = self.state.write();
            let edits = state.pending_edits;
            state.last_round_edits = edits;
            state.pending_edits = 0;

            let mut comment_count = 0;
            for entry in state.files.iter_mut() {
                let agent = annotations.remove(&entry.path).map(|a| a.comments);
                if !entry.snapshot_taken {
                    // Untouched this round: nothing to diff, open comments carry over.
                    entry.previous_content = entry.content.clone();
                }
                match agent {
                    Some(comments) => {
                        // Resolved comments leave the live list; code files keep
                        // theirs across edits, so this applies to edited files too.
                        entry.comments.retain(|live| {
                            !comments.iter().any(|c| c.id == live.id && c.resolved)
                        });
                        entry.previous_comments = comments;
                    }
                    None if !entry.snapshot_taken => {
                        entry.previous_comments = entry.comments.clone();
                    }
                    None => {}
                }
                let lines = entry.line_count();
                review_file::sanitize_resolution(&mut entry.previous_comments, lines);
                comment_count += entry.previous_comments.len();
                entry.snapshot_taken = false;
            }

            state.handoff_pending = false;
            let completed = state.round;
            state.round += 1;
            let paths: Vec<String> = state.files.iter().map(|f| f.path.clone()).collect();
            (completed, state.round, edits, comment_count as u32, paths)
        };

        if let Err(e) = review_file::remove(&review_path).await {
            warn!(error = %e, "failed to remove consumed review file");
        }
        if let Some(conn) = &self.db {
            if let Err(e) = db::record_round(conn, &self.id, completed, edits, comment_count).await {
                warn!(error = %e, "failed to record round");
            }
        }

        info!(round, edits, "round complete");
        self.events.publish(ReviewEvent::FileChanged { round, last_round_edits: edits, paths });
        if self.comment_count() > 0 {
            self.schedule_save();
        }
        round
    }

    /// The reviewer's finish action.
    ///
    /// Writes the review file synchronously, builds the agent prompt (empty
    /// when there are no live comments) and hands it to a parked agent if
    /// there is one. Never waits for an agent.
    ///
    /// # Errors
    ///
    /// `Persistence` when the review file cannot be written.
    pub async fn finish(&self) -> Result<FinishOutcome> {
        let snapshot = self.snapshot_review_file();
        let count: usize = snapshot.files.values().map(|f| f.comments.len()).sum();
        let round = snapshot.review_round;
        let review_path = self.review_file_path();

        review_file::save(&review_path, &snapshot)
            .await
            .map_err(|e| ReviewError::Persistence(e.to_string()))?;

        let review_file = review_path.display().to_string();
        let prompt = if count == 0 {
            String::new()
        } else {
            self.state.write().handoff_pending = true;
            build_prompt(count, &review_file, &self.options.advance_command)
        };

        let agent_notified = self
            .rendezvous
            .deliver(ReviewPrompt { prompt: prompt.clone(), review_file: review_file.clone() });

        if let Some(conn) = &self.db {
            if let Err(e) =
                db::record_finish(conn, &self.id, round, count as u32, agent_notified).await
            {
                warn!(error = %e, "failed to record finish");
            }
        }

        info!(round, comments = count, agent_notified, "review finished");
        Ok(FinishOutcome { prompt, review_file, agent_notified })
    }
}

fn build_prompt(count: usize, review_file: &str, advance_command: &str) -> String {
    let noun = if count == 1 { "comment" } else { "comments" };
    format!(
        "Address the {count} review {noun} in {review_file}.\n\
         For every comment you address, set \"resolved\": true, add a short \
         \"resolution_note\", and list the \"resolution_lines\" of the new content \
         that address it.\n\
         When all edits are done, run: {advance_command}"
    )
}
