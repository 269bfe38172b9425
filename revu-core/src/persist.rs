//! Debounced review-file writer.
//!
//! Comment mutations only ping a capacity-1 channel. This task waits for a
//! ping, lets the debounce window pass (absorbing further pings), then writes
//! the file once. A failed write is logged; the next ping retries.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::Session;

pub fn spawn_persister(
    session: Arc<Session>,
    mut save_rx: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let debounce = session.options().debounce;
        loop {
            tokio::select! {
                ping = save_rx.recv() => {
                    if ping.is_none() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            tokio::time::sleep(debounce).await;
            while save_rx.try_recv().is_ok() {}

            match session.save_review_file().await {
                Ok(true) => debug!("review file saved"),
                Ok(false) => debug!("review file held by agent, save deferred"),
                Err(e) => warn!(error = %e, "persistence failure, will retry on next change"),
            }
        }

        // A ping still queued here was never written.
        if save_rx.try_recv().is_ok() {
            if let Err(e) = session.save_review_file().await {
                warn!(error = %e, "final review file flush failed");
            }
        }
    })
}
