//! Single-slot handshake between the finish action and a waiting agent.
//!
//! At most one waiter is parked at a time; a new waiter replaces the old one,
//! whose wait then fails with `Disconnected`. Delivery never blocks: with no
//! waiter parked it is a no-op that reports `false`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Result, ReviewError};
use crate::types::ReviewPrompt;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<ReviewPrompt>,
}

/// The finish-to-agent handshake slot.
#[derive(Clone, Default)]
pub struct Rendezvous {
    slot: Arc<Mutex<Option<Waiter>>>,
    tickets: Arc<AtomicU64>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the caller until [`Rendezvous::deliver`] runs.
    ///
    /// Dropping the returned future (a disconnected HTTP client) clears the
    /// slot so a later delivery reports `false`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Disconnected` when a newer waiter replaced this one
    /// or [`Rendezvous::close`] released it.
    pub async fn wait(&self) -> Result<ReviewPrompt> {
        let (ticket, rx) = self.park();
        let _guard = SlotGuard { slot: &self.slot, ticket };
        rx.await.map_err(|_| ReviewError::Disconnected)
    }

    /// Hands `prompt` to the parked waiter, if any.
    ///
    /// Returns `true` only when a live waiter received it.
    pub fn deliver(&self, prompt: ReviewPrompt) -> bool {
        match self.slot.lock().take() {
            Some(waiter) => waiter.tx.send(prompt).is_ok(),
            None => false,
        }
    }

    /// Fails the parked waiter, if any, with `Disconnected`.
    pub fn close(&self) {
        self.slot.lock().take();
    }

    /// Whether a live waiter is currently parked.
    pub fn has_waiter(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|w| !w.tx.is_closed())
    }

    fn park(&self) -> (u64, oneshot::Receiver<ReviewPrompt>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        // Replacing drops the previous sender, failing the older wait.
        *self.slot.lock() = Some(Waiter { ticket, tx });
        (ticket, rx)
    }
}

struct SlotGuard<'a> {
    slot: &'a Mutex<Option<Waiter>>,
    ticket: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|w| w.ticket == self.ticket) {
            *slot = None;
        }
    }
}
