//! Background file watcher.
//!
//! One task per session waits on two sources at once: a poll tick that hashes
//! every tracked file on disk, and the external round-complete signal. Each
//! wake-up handles whichever fired and goes back to waiting on both, so edits
//! keep being counted for the whole round.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::review_file::content_hash;
use crate::session::Session;
use crate::types::FileKind;

/// Spawns the watcher loop for `session`.
///
/// The loop exits when `shutdown` becomes `true` or the round signal channel
/// closes.
pub fn spawn_watcher(
    session: Arc<Session>,
    round_rx: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_watcher(session, round_rx, shutdown).await;
        debug!("file watcher stopped");
    })
}

async fn run_watcher(
    session: Arc<Session>,
    mut round_rx: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(session.options().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&session).await;
            }
            signal = round_rx.recv() => {
                match signal {
                    Some(()) => {
                        // Pick up edits that landed since the last tick first.
                        poll_once(&session).await;
                        let round = session.complete_round().await;
                        info!(round, "advanced to next round");
                    }
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Hashes every tracked file on disk and records the ones that changed.
///
/// Returns the number of edits recorded. Read failures other than a missing
/// file are logged and skipped until the next tick.
pub async fn poll_once(session: &Session) -> usize {
    let targets = session.watch_targets();
    let mut recorded = 0;

    for target in targets {
        let bytes = match tokio::fs::read(&target.abs_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %target.path, error = %e, "failed to read tracked file");
                continue;
            }
        };
        let hash = content_hash(&bytes);
        if hash == target.hash {
            continue;
        }
        let content = match target.kind {
            FileKind::Document => Some(String::from_utf8_lossy(&bytes).into_owned()),
            FileKind::Code => None,
        };
        match session.record_edit(&target.path, content, hash) {
            Ok(Some(_)) => recorded += 1,
            Ok(None) => {}
            Err(e) => warn!(path = %target.path, error = %e, "edit not recorded"),
        }
    }
    recorded
}

/// What the watcher needs to know about one file, copied out of the lock.
pub(crate) struct WatchTarget {
    pub path: String,
    pub abs_path: PathBuf,
    pub kind: FileKind,
    pub hash: String,
}

impl Session {
    pub(crate) fn watch_targets(&self) -> Vec<WatchTarget> {
        let root = &self.options.repo_root;
        self.state
            .read()
            .files
            .iter()
            .map(|f| WatchTarget {
                path: f.path.clone(),
                abs_path: root.join(&f.path),
                kind: f.kind,
                hash: f.content_hash.clone(),
            })
            .collect()
    }
}
