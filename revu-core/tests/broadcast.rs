//! Event fan-out and the finish handshake slot.

use std::time::Duration;

use revu_core::broadcast::Broadcaster;
use revu_core::rendezvous::Rendezvous;
use revu_core::types::{ReviewEvent, ReviewPrompt};
use revu_core::ReviewError;

fn prompt(text: &str) -> ReviewPrompt {
    ReviewPrompt { prompt: text.to_owned(), review_file: "/tmp/.revu.json".to_owned() }
}

#[tokio::test]
async fn full_mailbox_drops_without_blocking() {
    let events = Broadcaster::new(2);
    let mut slow = events.subscribe();
    let mut fast = events.subscribe();

    assert_eq!(events.publish(ReviewEvent::EditDetected { edit_count: 1 }), 2);
    assert_eq!(fast.try_recv(), Some(ReviewEvent::EditDetected { edit_count: 1 }));
    assert_eq!(events.publish(ReviewEvent::EditDetected { edit_count: 2 }), 2);
    assert_eq!(fast.try_recv(), Some(ReviewEvent::EditDetected { edit_count: 2 }));

    // `slow` is now full; publishing must still return promptly.
    let delivered = tokio::time::timeout(
        Duration::from_secs(1),
        async { events.publish(ReviewEvent::EditDetected { edit_count: 3 }) },
    )
    .await
    .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(fast.try_recv(), Some(ReviewEvent::EditDetected { edit_count: 3 }));

    // Once drained, the slow viewer receives later events again.
    assert_eq!(slow.try_recv(), Some(ReviewEvent::EditDetected { edit_count: 1 }));
    assert_eq!(slow.try_recv(), Some(ReviewEvent::EditDetected { edit_count: 2 }));
    assert_eq!(slow.try_recv(), None);
    let changed = ReviewEvent::FileChanged { round: 2, last_round_edits: 3, paths: vec![] };
    assert_eq!(events.publish(changed.clone()), 2);
    assert_eq!(slow.recv().await, Some(changed));
}

#[tokio::test]
async fn shutdown_with_full_mailbox_still_ends_the_stream() {
    let events = Broadcaster::new(1);
    let mut viewer = events.subscribe();
    assert_eq!(events.publish(ReviewEvent::EditDetected { edit_count: 1 }), 1);

    events.shutdown();
    assert_eq!(viewer.recv().await, Some(ReviewEvent::EditDetected { edit_count: 1 }));
    assert_eq!(viewer.recv().await, None);
}

#[tokio::test]
async fn dropped_subscription_unregisters() {
    let events = Broadcaster::new(4);
    let first = events.subscribe();
    let _second = events.subscribe();
    assert_eq!(events.subscriber_count(), 2);

    drop(first);
    assert_eq!(events.subscriber_count(), 1);
    assert_eq!(events.publish(ReviewEvent::EditDetected { edit_count: 1 }), 1);
}

#[tokio::test]
async fn shutdown_closes_every_mailbox() {
    let events = Broadcaster::new(4);
    let mut viewer = events.subscribe();

    events.shutdown();
    assert_eq!(viewer.recv().await, Some(ReviewEvent::ServerShutdown));
    assert_eq!(viewer.recv().await, None);
    assert_eq!(events.subscriber_count(), 0);

    let mut late = events.subscribe();
    assert_eq!(late.recv().await, None);
    assert_eq!(events.publish(ReviewEvent::EditDetected { edit_count: 1 }), 0);
}

#[tokio::test]
async fn deliver_without_waiter_is_a_no_op() {
    let rendezvous = Rendezvous::new();
    assert!(!rendezvous.has_waiter());
    assert!(!rendezvous.deliver(prompt("nobody listening")));
}

#[tokio::test]
async fn waiter_receives_delivery() {
    let rendezvous = Rendezvous::new();
    let waiting = rendezvous.clone();
    let agent = tokio::spawn(async move { waiting.wait().await });
    while !rendezvous.has_waiter() {
        tokio::task::yield_now().await;
    }

    assert!(rendezvous.deliver(prompt("address 2 comments")));
    assert_eq!(agent.await.unwrap().unwrap(), prompt("address 2 comments"));
    assert!(!rendezvous.has_waiter());
    assert!(!rendezvous.deliver(prompt("again")), "delivery consumes the waiter");
}

#[tokio::test]
async fn dropped_waiter_clears_the_slot() {
    let rendezvous = Rendezvous::new();
    let waiting = rendezvous.clone();
    // Aborting drops the wait future, as a hung-up HTTP client does.
    let agent = tokio::spawn(async move { waiting.wait().await });
    while !rendezvous.has_waiter() {
        tokio::task::yield_now().await;
    }

    agent.abort();
    assert!(agent.await.unwrap_err().is_cancelled());
    assert!(!rendezvous.has_waiter());
    assert!(!rendezvous.deliver(prompt("too late")));
}

#[tokio::test]
async fn timed_out_waiter_clears_the_slot() {
    let rendezvous = Rendezvous::new();
    let result = tokio::time::timeout(Duration::from_millis(10), rendezvous.wait()).await;
    assert!(result.is_err());
    assert!(!rendezvous.has_waiter());
    assert!(!rendezvous.deliver(prompt("too late")));
}

#[tokio::test]
async fn newer_waiter_supersedes_older() {
    let rendezvous = Rendezvous::new();
    let first = rendezvous.clone();
    let older = tokio::spawn(async move { first.wait().await });
    while !rendezvous.has_waiter() {
        tokio::task::yield_now().await;
    }

    let second = rendezvous.clone();
    let newer = tokio::spawn(async move { second.wait().await });
    assert!(matches!(older.await.unwrap(), Err(ReviewError::Disconnected)));

    // The older waiter's guard must not clear the newer waiter's slot.
    while !rendezvous.has_waiter() {
        tokio::task::yield_now().await;
    }
    assert!(rendezvous.deliver(prompt("for the newer one")));
    assert_eq!(newer.await.unwrap().unwrap().prompt, "for the newer one");
}

#[tokio::test]
async fn close_releases_parked_waiter() {
    let rendezvous = Rendezvous::new();
    let waiting = rendezvous.clone();
    let agent = tokio::spawn(async move { waiting.wait().await });
    while !rendezvous.has_waiter() {
        tokio::task::yield_now().await;
    }

    rendezvous.close();
    assert!(matches!(agent.await.unwrap(), Err(ReviewError::Disconnected)));
}
