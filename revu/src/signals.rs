//! Termination signal handling.
//!
//! SIGTERM and SIGINT set a shared flag (signal-hook); the shutdown future
//! polls it on a short heartbeat so a quiescent server still notices the
//! signal promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag::register;

/// Heartbeat between flag checks.
const HEARTBEAT: Duration = Duration::from_millis(50);

/// Registers SIGTERM and SIGINT handlers that set the returned flag.
///
/// Registration failures are ignored: the process then simply cannot be
/// stopped gracefully by that signal.
pub fn register_termination() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let _ = register(SIGTERM, Arc::clone(&flag));
    let _ = register(SIGINT, Arc::clone(&flag));
    flag
}

/// Resolves once `flag` is set.
pub async fn wait_for(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(HEARTBEAT).await;
    }
}
