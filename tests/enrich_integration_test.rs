
use std::sync::Arc;
use std::time::Duration;

use cloud_enrich::Address;
use cloud_enrich::Event;
use cloud_enrich::Handler;
use cloud_enrich::Metric;
use cloud_enrich::MetricKind;
use cloud_enrich::test_utils::FakeProvider;
use cloud_enrich::test_utils::sample_instance;
use tokio::time::timeout;

use commons::recv_event;
use commons::recv_metric;
use commons::start_pipeline;

fn metric(name: &str, source: Option<Address>) -> Metric {
    Metric {
        name: name.to_string(),
        value: 42.0,
        kind: MetricKind::Counter,
        tags: vec!["env:prod".to_string()],
        hostname: String::new(),
        source,
    }
}

fn event(title: &str, source: Option<Address>) -> Event {
    Event {
        title: title.to_string(),
        text: "deployment finished".to_string(),
        tags: Vec::new(),
        hostname: String::new(),
        source,
    }
}

#[tokio::test(start_paused = true)]
async fn test_metrics_are_enriched_through_the_pipeline() {
    let address = Address::from("172.16.0.1");
    let provider = FakeProvider::new(8);
    provider.set_instance(
        address.clone(),
        sample_instance("i-abc", "us-west-2", &["team:obs"]),
    );
    let mut pipeline = start_pipeline(provider);

    // First metric misses and resolves through the provider.
    pipeline
        .enricher
        .dispatch_metric(metric("requests", Some(address.clone())))
        .await
        .expect("dispatch should succeed");
    let first = recv_metric(&mut pipeline.metric_rx).await;
    assert_eq!(first.hostname, "i-abc");
    assert_eq!(
        first.tags,
        vec![
            "env:prod".to_string(),
            "region:us-west-2".to_string(),
            "team:obs".to_string(),
        ]
    );

    // Later metrics for the same source are cache hits.
    for _ in 0..3 {
        pipeline
            .enricher
            .dispatch_metric(metric("requests", Some(address.clone())))
            .await
            .expect("dispatch should succeed");
        let enriched = recv_metric(&mut pipeline.metric_rx).await;
        assert_eq!(enriched.hostname, "i-abc");
    }
    assert_eq!(pipeline.provider.calls(), 1, "one lookup serves every hit");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_absent_sources_forward_unenriched() {
    let provider = FakeProvider::new(8);
    let mut pipeline = start_pipeline(provider);

    pipeline
        .enricher
        .dispatch_metric(metric("no_source", None))
        .await
        .expect("dispatch should succeed");
    let untouched = recv_metric(&mut pipeline.metric_rx).await;
    assert_eq!(untouched.tags, vec!["env:prod".to_string()]);
    assert!(untouched.hostname.is_empty());
    assert_eq!(pipeline.provider.calls(), 0);

    // A looked-up address without an instance forwards unenriched too,
    // but does consult the provider once.
    let address = Address::from("172.16.0.9");
    pipeline
        .enricher
        .dispatch_metric(metric("absent", Some(address)))
        .await
        .expect("dispatch should succeed");
    let untouched = recv_metric(&mut pipeline.metric_rx).await;
    assert_eq!(untouched.tags, vec!["env:prod".to_string()]);
    assert!(untouched.hostname.is_empty());
    assert_eq!(pipeline.provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_drain_before_shutdown() {
    let address = Address::from("172.16.0.2");
    let provider = FakeProvider::new(8);
    provider.set_instance(address.clone(), sample_instance("i-def", "eu-central-1", &[]));
    let mut pipeline = start_pipeline(provider);

    for i in 0..3 {
        pipeline
            .enricher
            .dispatch_event(event(&format!("deploy-{i}"), Some(address.clone())))
            .await
            .expect("dispatch should succeed");
    }

    timeout(Duration::from_secs(5), pipeline.enricher.wait_for_events())
        .await
        .expect("all accepted events should drain");

    for _ in 0..3 {
        let forwarded = recv_event(&mut pipeline.event_rx).await;
        assert_eq!(forwarded.hostname, "i-def");
    }
}

#[tokio::test]
async fn test_shutdown_cancels_new_dispatches() {
    let provider = FakeProvider::new(8);
    let pipeline = start_pipeline(provider);

    pipeline.shutdown_tx.send(()).expect("send shutdown");
    timeout(Duration::from_secs(5), pipeline.worker_handle)
        .await
        .expect("worker should stop")
        .expect("worker task should not panic")
        .expect("worker should exit cleanly");

    let err = pipeline
        .enricher
        .dispatch_metric(metric("late", Some(Address::from("172.16.0.3"))))
        .await
        .expect_err("dispatch after shutdown should be rejected");
    assert!(err.is_cancelled());
}

// Clones share one cache: a hit primed through one handle serves the
// other without another lookup.
#[tokio::test(start_paused = true)]
async fn test_cloned_enrichers_share_the_cache() {
    let address = Address::from("172.16.0.4");
    let provider = FakeProvider::new(8);
    provider.set_instance(address.clone(), sample_instance("i-ghi", "us-east-2", &[]));
    let mut pipeline = start_pipeline(provider);

    pipeline
        .enricher
        .dispatch_metric(metric("prime", Some(address.clone())))
        .await
        .expect("dispatch should succeed");
    recv_metric(&mut pipeline.metric_rx).await;

    let clone = pipeline.enricher.clone();
    let second = Arc::new(clone);
    second
        .dispatch_metric(metric("hit", Some(address)))
        .await
        .expect("dispatch should succeed");
    let enriched = recv_metric(&mut pipeline.metric_rx).await;
    assert_eq!(enriched.hostname, "i-ghi");
    assert_eq!(pipeline.provider.calls(), 1);
}
