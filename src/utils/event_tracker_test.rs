use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::EventTracker;

#[tokio::test]
async fn test_wait_returns_immediately_at_zero() {
    let tracker = EventTracker::new();
    tokio::time::timeout(Duration::from_secs(1), tracker.wait())
        .await
        .expect("wait on an empty tracker should not block");
}

#[tokio::test]
async fn test_wait_blocks_until_all_done() {
    let tracker = Arc::new(EventTracker::new());
    tracker.add(2);

    let released = Arc::new(AtomicBool::new(false));
    let waiter = {
        let tracker = tracker.clone();
        let released = released.clone();
        tokio::spawn(async move {
            tracker.wait().await;
            released.store(true, Ordering::SeqCst);
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!released.load(Ordering::SeqCst));

    tracker.done(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!released.load(Ordering::SeqCst), "one event still in flight");

    tracker.done(1);
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should be released")
        .expect("waiter task should not panic");
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_batched_decrement() {
    let tracker = Arc::new(EventTracker::new());
    tracker.add(1);
    tracker.add(1);
    tracker.add(1);
    assert_eq!(tracker.in_flight(), 3);

    tracker.done(3);
    assert_eq!(tracker.in_flight(), 0);
    tokio::time::timeout(Duration::from_secs(1), tracker.wait())
        .await
        .expect("batched release should unblock wait");
}

#[tokio::test]
async fn test_multiple_waiters_released() {
    let tracker = Arc::new(EventTracker::new());
    tracker.add(1);

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let tracker = tracker.clone();
        waiters.push(tokio::spawn(async move { tracker.wait().await }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    tracker.done(1);

    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("every waiter should be released")
            .expect("waiter task should not panic");
    }
}
