//! revu — review agent edits in the browser, round after round.
//!
//! Entry point for the `revu` binary.
//!
//! # Startup sequence
//!
//! 1. Parse the CLI, initialise tracing, load the TOML config.
//! 2. Spawn the git worker; without a repository only explicitly listed files
//!    are reviewed.
//! 3. Open the session database (WAL-mode SQLite) under the data dir.
//! 4. Bind the listener first so the agent's round-advance command can name
//!    the real address.
//! 5. Open the session, start the watcher and persister, serve until SIGTERM
//!    or SIGINT.
//!
//! # Shutdown
//!
//! The signal flag resolves the graceful-shutdown future, which broadcasts
//! `server_shutdown` (closing every event stream and releasing a parked agent)
//! before axum drains connections. The persister flushes pending comments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use revu::config::{self, Config};
use revu::git::GitHandle;
use revu::server::{self, AppState};
use revu::signals;
use revu_core::types::{FileStatus, TrackedFile};
use revu_core::{Session, SessionOptions};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "revu", about = "Review agent edits in the browser", version)]
struct Cli {
    /// Files to review; defaults to every file changed against the base ref
    files: Vec<String>,

    /// Listen port (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,

    /// Git ref the review diffs against
    #[arg(long)]
    base_ref: Option<String>,

    /// Config file (defaults to $XDG_CONFIG_HOME/revu/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::load(&cli.config.clone().unwrap_or_else(config::config_path));
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_ref) = cli.base_ref.clone() {
        config.base_ref = base_ref;
    }

    let cwd = std::env::current_dir()?;
    let git = match GitHandle::spawn(&cwd.to_string_lossy()) {
        Ok(git) => Some(git),
        Err(e) => {
            warn!(error = %e, "no git repository, reviewing listed files only");
            None
        }
    };
    let repo_root = git
        .as_ref()
        .map(|g| PathBuf::from(g.workdir()))
        .unwrap_or_else(|| cwd.clone());

    let files = tracked_files(&cli.files, &config, git.as_ref(), &repo_root, &cwd).await;
    if files.is_empty() {
        error!("nothing to review: no files given and no changes against {}", config.base_ref);
        return Ok(());
    }

    let data_dir = repo_root.join(&config.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("sessions.db");
    let db = match revu_core::db::open_db(&db_path.to_string_lossy()).await {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!(error = %e, "session database unavailable, round history disabled");
            None
        }
    };

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    let branch = match &git {
        Some(g) => g.branch_name().await,
        None => None,
    };
    let options = SessionOptions {
        repo_root: repo_root.clone(),
        review_file: PathBuf::from(&config.review_file),
        base_ref: config.base_ref.clone(),
        branch,
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        debounce: Duration::from_millis(config.debounce_ms),
        mailbox_capacity: config.mailbox_capacity,
        advance_command: format!("curl -s -X POST http://{addr}/api/round-complete"),
    };
    let session = Session::open(options, files, db.clone())
        .await
        .map_err(std::io::Error::other)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let background = session.start(shutdown_rx);

    let term_flag = signals::register_termination();
    let app = server::router(AppState { session: session.clone(), git });
    info!("reviewing {} files at http://{addr}", session.files().len());

    let shutdown_session = session.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signals::wait_for(term_flag).await;
            info!("shutting down");
            shutdown_session.shutdown();
            let _ = shutdown_tx.send(true);
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "server error");
    }

    for handle in background {
        let _ = handle.await;
    }
    if let Some(conn) = &db {
        if let Err(e) = revu_core::db::update_session_timestamp(conn, session.id()).await {
            warn!(error = %e, "failed to update session timestamp");
        }
    }
    info!("revu stopped");
    Ok(())
}

/// Resolves the files to review.
///
/// Explicit paths are taken relative to the working directory and re-rooted
/// at the repository; their status comes from git when git knows the path.
/// Without explicit paths every changed file is reviewed, except revu's own
/// review file and data directory.
async fn tracked_files(
    explicit: &[String],
    config: &Config,
    git: Option<&GitHandle>,
    repo_root: &Path,
    cwd: &Path,
) -> Vec<TrackedFile> {
    let changed = match git {
        Some(g) => g.changed_files(&config.base_ref).await.unwrap_or_else(|e| {
            warn!(error = %e, "cannot list changed files");
            Vec::new()
        }),
        None => Vec::new(),
    };

    if explicit.is_empty() {
        return changed
            .into_iter()
            .filter(|c| c.path != config.review_file && !c.path.starts_with(&format!("{}/", config.data_dir)))
            .map(|c| {
                let mut file = TrackedFile::new(c.path, c.status);
                file.added = c.added;
                file.removed = c.removed;
                file
            })
            .collect();
    }

    let by_path: HashMap<_, _> = changed.into_iter().map(|c| (c.path.clone(), c)).collect();
    let prefix = cwd.strip_prefix(repo_root).unwrap_or(Path::new(""));
    explicit
        .iter()
        .map(|p| {
            let rel = prefix.join(p).to_string_lossy().into_owned();
            match by_path.get(&rel) {
                Some(c) => {
                    let mut file = TrackedFile::new(rel, c.status);
                    file.added = c.added;
                    file.removed = c.removed;
                    file
                }
                None => TrackedFile::new(rel, FileStatus::Modified),
            }
        })
        .collect()
}
