use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::timeout;

use super::handler::Enricher;
use super::handler::InstanceHolder;
use super::worker::EnricherWorker;
use crate::config::CacheConfig;
use crate::handler::Handler;
use crate::test_utils::ChannelHandler;
use crate::test_utils::FakeProvider;
use crate::test_utils::NoopLimiter;
use crate::test_utils::enable_logger;
use crate::test_utils::sample_event;
use crate::test_utils::sample_instance;
use crate::test_utils::sample_metric;
use crate::types::Address;
use crate::types::Event;
use crate::types::Metric;

struct FastPathHarness {
    enricher: Enricher,
    // Kept alive so handoff channels stay open; the loop is deliberately
    // not running in fast-path tests.
    _worker: EnricherWorker,
    metric_rx: mpsc::UnboundedReceiver<Metric>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    _shutdown_tx: watch::Sender<()>,
}

fn setup() -> FastPathHarness {
    enable_logger();
    let (handler, metric_rx, event_rx) = ChannelHandler::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (enricher, worker) = Enricher::new(
        Arc::new(FakeProvider::new(10)),
        handler,
        Arc::new(NoopLimiter),
        CacheConfig::default(),
        shutdown_rx,
    );
    FastPathHarness {
        enricher,
        _worker: worker,
        metric_rx,
        event_rx,
        _shutdown_tx: shutdown_tx,
    }
}

#[tokio::test]
async fn test_cache_hit_forwards_synchronously() {
    let mut h = setup();
    let address = Address::from("10.0.0.1");
    h.enricher.insert_holder(
        address.clone(),
        Some(sample_instance("i-1", "us-east-1", &["a"])),
        Duration::from_secs(300),
    );

    h.enricher
        .dispatch_metric(sample_metric("cpu", Some(address)))
        .await
        .expect("hit should forward");

    let forwarded = h.metric_rx.try_recv().expect("metric should be downstream already");
    assert_eq!(forwarded.hostname, "i-1");
    assert_eq!(
        forwarded.tags,
        vec!["region:us-east-1".to_string(), "a".to_string()]
    );
}

#[tokio::test]
async fn test_negative_hit_forwards_unenriched() {
    let mut h = setup();
    let address = Address::from("10.0.0.2");
    h.enricher
        .insert_holder(address.clone(), None, Duration::from_secs(60));

    h.enricher
        .dispatch_event(sample_event("deploy", Some(address)))
        .await
        .expect("negative hit should forward");

    let forwarded = h.event_rx.try_recv().expect("event should be downstream already");
    assert!(forwarded.tags.is_empty());
    assert!(forwarded.hostname.is_empty());
}

#[tokio::test]
async fn test_unknown_source_bypasses_cache() {
    let mut h = setup();

    h.enricher
        .dispatch_metric(sample_metric("cpu", None))
        .await
        .expect("unknown source should forward directly");

    let forwarded = h.metric_rx.try_recv().expect("metric should be downstream already");
    assert!(forwarded.tags.is_empty());
    assert!(forwarded.hostname.is_empty());
    assert_eq!(h.enricher.cache_len(), 0);
}

#[tokio::test]
async fn test_miss_hands_off_and_backpressures() {
    let h = setup();
    let address = Address::from("10.0.0.3");

    // First miss fits the one-slot handoff channel.
    h.enricher
        .dispatch_metric(sample_metric("cpu", Some(address.clone())))
        .await
        .expect("handoff should be accepted");

    // With the worker not draining, the next producer blocks.
    let second = h
        .enricher
        .dispatch_metric(sample_metric("cpu", Some(address)));
    assert!(
        timeout(Duration::from_millis(100), second).await.is_err(),
        "second handoff should block while the worker is busy"
    );
}

#[tokio::test]
async fn test_event_miss_counts_in_flight() {
    let h = setup();

    h.enricher
        .dispatch_event(sample_event("deploy", Some(Address::from("10.0.0.4"))))
        .await
        .expect("handoff should be accepted");

    assert_eq!(h.enricher.shared.tracker.in_flight(), 1);
    assert!(
        timeout(Duration::from_millis(100), h.enricher.wait_for_events())
            .await
            .is_err(),
        "drain barrier should wait for the queued event"
    );
}

#[tokio::test]
async fn test_fast_path_hit_does_not_count_in_flight() {
    let h = setup();
    let address = Address::from("10.0.0.5");
    h.enricher
        .insert_holder(address.clone(), None, Duration::from_secs(60));

    h.enricher
        .dispatch_event(sample_event("deploy", Some(address)))
        .await
        .expect("hit should forward");

    assert_eq!(h.enricher.shared.tracker.in_flight(), 0);
}

#[tokio::test]
async fn test_dispatch_after_worker_gone_is_cancelled() {
    let h = setup();
    let FastPathHarness { enricher, _worker, .. } = h;
    drop(_worker);

    let err = enricher
        .dispatch_metric(sample_metric("cpu", Some(Address::from("10.0.0.6"))))
        .await
        .expect_err("handoff without a worker should fail");
    assert!(err.is_cancelled());

    let err = enricher
        .dispatch_event(sample_event("deploy", Some(Address::from("10.0.0.6"))))
        .await
        .expect_err("handoff without a worker should fail");
    assert!(err.is_cancelled());
    // The rejected event must not leak into the drain barrier.
    assert_eq!(enricher.shared.tracker.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hit_advances_last_access() {
    let h = setup();
    let address = Address::from("10.0.0.7");
    h.enricher
        .insert_holder(address.clone(), None, Duration::from_secs(300));
    let before = h
        .enricher
        .holder(&address)
        .expect("holder just inserted")
        .last_access();

    tokio::time::advance(Duration::from_secs(5)).await;
    h.enricher
        .dispatch_metric(sample_metric("cpu", Some(address.clone())))
        .await
        .expect("hit should forward");

    let after = h
        .enricher
        .holder(&address)
        .expect("holder still cached")
        .last_access();
    assert!(after > before, "hit should advance last access");
}

#[test]
fn test_holder_touch_is_monotonic() {
    let holder = InstanceHolder::new(None, Instant::now(), 10);

    holder.touch(5);
    assert_eq!(holder.last_access(), 10, "stale touch must not regress");

    holder.touch(20);
    assert_eq!(holder.last_access(), 20);
}
