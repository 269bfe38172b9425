//! One-to-many live event fan-out.
//!
//! Each viewer registers a bounded mailbox. [`Broadcaster::publish`] never
//! waits: a full mailbox loses that one event, a closed mailbox is pruned. A
//! dropped `EditDetected` is harmless because the next `FileChanged` carries
//! the full refreshed state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::types::ReviewEvent;

struct Mailbox {
    id: u64,
    tx: mpsc::Sender<ReviewEvent>,
}

#[derive(Default)]
struct Registry {
    mailboxes: Vec<Mailbox>,
    closed: bool,
}

/// Registry of connected viewers.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl Broadcaster {
    /// Creates a broadcaster whose mailboxes hold `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new viewer mailbox.
    ///
    /// After [`Broadcaster::shutdown`] the returned subscription is already
    /// closed and yields nothing.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.lock();
        if !registry.closed {
            registry.mailboxes.push(Mailbox { id, tx });
        }
        Subscription { id, rx, registry: Arc::clone(&self.inner) }
    }

    /// Enqueues `event` into every mailbox without blocking.
    ///
    /// Returns the number of mailboxes that accepted the event.
    pub fn publish(&self, event: ReviewEvent) -> usize {
        let mut registry = self.inner.lock();
        let mut delivered = 0;
        registry.mailboxes.retain(|mailbox| match mailbox.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = mailbox.id, event = event.name(), "mailbox full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Sends `ServerShutdown` to every mailbox and closes them all.
    ///
    /// A full mailbox misses the `ServerShutdown` event; its stream still ends,
    /// and the end of the stream is the terminal signal every viewer gets.
    /// Later subscriptions are closed on creation.
    pub fn shutdown(&self) {
        let mut registry = self.inner.lock();
        for mailbox in &registry.mailboxes {
            if mailbox.tx.try_send(ReviewEvent::ServerShutdown).is_err() {
                debug!(subscriber = mailbox.id, "mailbox full, shutdown event dropped");
            }
        }
        registry.mailboxes.clear();
        registry.closed = true;
    }

    /// Number of currently registered mailboxes.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().mailboxes.len()
    }
}

/// Receiving end of one viewer's mailbox; unregisters itself on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ReviewEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// Waits for the next event; `None` once the broadcaster shut down.
    pub async fn recv(&mut self) -> Option<ReviewEvent> {
        self.rx.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ReviewEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let id = self.id;
        self.registry.lock().mailboxes.retain(|m| m.id != id);
    }
}
