pub mod types;
pub mod worker;

use crossbeam_channel::Sender;
use revu_core::types::Hunk;
use tokio::sync::oneshot;

use self::types::{ChangedFile, GitRequest};

/// Async handle to the git worker thread.
#[derive(Clone)]
pub struct GitHandle {
    tx: Sender<GitRequest>,
    workdir: String,
}

impl GitHandle {
    /// Spawns the worker thread and opens the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns the git error message when no repository can be opened.
    pub fn spawn(path: &str) -> Result<Self, String> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let path = path.to_owned();
        std::thread::Builder::new()
            .name("revu-git".to_owned())
            .spawn(move || worker::git_worker_loop(path, rx, ready_tx))
            .map_err(|e| e.to_string())?;
        let workdir = ready_rx
            .recv()
            .map_err(|_| "git worker exited during startup".to_owned())??;
        Ok(Self { tx, workdir })
    }

    /// Root of the repository's working tree.
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub async fn changed_files(&self, base_ref: &str) -> Result<Vec<ChangedFile>, String> {
        let (reply, rx) = oneshot::channel();
        self.send(GitRequest::ChangedFiles { base_ref: base_ref.to_owned(), reply })?;
        rx.await.map_err(|_| worker_gone())?
    }

    pub async fn file_diff(&self, path: &str, base_ref: &str) -> Result<Vec<Hunk>, String> {
        let (reply, rx) = oneshot::channel();
        self.send(GitRequest::FileDiff {
            path: path.to_owned(),
            base_ref: base_ref.to_owned(),
            reply,
        })?;
        rx.await.map_err(|_| worker_gone())?
    }

    pub async fn branch_name(&self) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.send(GitRequest::BranchName { reply }).ok()?;
        rx.await.ok().flatten()
    }

    fn send(&self, request: GitRequest) -> Result<(), String> {
        self.tx.send(request).map_err(|_| worker_gone())
    }
}

fn worker_gone() -> String {
    "git worker is not running".to_owned()
}
