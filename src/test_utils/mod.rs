//! Hand-written fakes and helpers shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;

use crate::Error;
use crate::Result;
use crate::errors::ProviderError;
use crate::handler::Handler;
use crate::limiter::TokenAcquirer;
use crate::provider::CloudProvider;
use crate::provider::LookupOutcome;
use crate::types::Address;
use crate::types::Event;
use crate::types::Instance;
use crate::types::Metric;
use crate::types::MetricKind;

/// Initializes a fmt subscriber for test output. Safe to call from every
/// test; only the first call wins.
pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn sample_metric(name: &str, source: Option<Address>) -> Metric {
    Metric {
        name: name.to_string(),
        value: 1.0,
        kind: MetricKind::Gauge,
        tags: Vec::new(),
        hostname: String::new(),
        source,
    }
}

pub fn sample_event(title: &str, source: Option<Address>) -> Event {
    Event {
        title: title.to_string(),
        text: "something happened".to_string(),
        tags: Vec::new(),
        hostname: String::new(),
        source,
    }
}

pub fn sample_instance(id: &str, region: &str, tags: &[&str]) -> Arc<Instance> {
    Arc::new(Instance {
        id: id.to_string(),
        region: region.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    })
}

/// Scriptable in-memory [`CloudProvider`].
///
/// Lookups resolve from a response table (unknown addresses come back
/// absent), can be switched to whole-batch failure, and can be gated on a
/// semaphore so a test controls exactly when a lookup completes. Every
/// call and its batch are recorded.
pub struct FakeProvider {
    max_batch_size: usize,
    gate: Option<Arc<Semaphore>>,
    responses: Mutex<HashMap<Address, LookupOutcome>>,
    fail_all: AtomicBool,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<Address>>>,
}

impl FakeProvider {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            gate: None,
            responses: Mutex::new(HashMap::new()),
            fail_all: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Gated variant: each `describe_batch` call consumes one permit, so
    /// tests release lookups one at a time via `add_permits(1)`.
    pub fn gated(max_batch_size: usize) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let provider = Self {
            gate: Some(gate.clone()),
            ..Self::new(max_batch_size)
        };
        (provider, gate)
    }

    pub fn set_outcome(&self, address: Address, outcome: LookupOutcome) {
        self.responses.lock().insert(address, outcome);
    }

    pub fn set_instance(&self, address: Address, instance: Arc<Instance>) {
        self.set_outcome(address, LookupOutcome::Found(instance));
    }

    /// When set, every subsequent lookup fails as a whole batch.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<Address>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn describe_batch(
        &self,
        addresses: Vec<Address>,
    ) -> std::result::Result<HashMap<Address, LookupOutcome>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().push(addresses.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ProviderError::Request("lookup gate closed".to_string()))?;
            permit.forget();
        }

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("simulated provider outage".to_string()));
        }

        let responses = self.responses.lock();
        Ok(addresses
            .iter()
            .filter_map(|address| {
                responses
                    .get(address)
                    .cloned()
                    .map(|outcome| (address.clone(), outcome))
            })
            .collect())
    }
}

/// Downstream [`Handler`] that forwards every item into unbounded
/// channels for the test to assert on.
pub struct ChannelHandler {
    metric_tx: mpsc::UnboundedSender<Metric>,
    event_tx: mpsc::UnboundedSender<Event>,
    fail_next_metric: AtomicBool,
}

impl ChannelHandler {
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<Metric>,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let (metric_tx, metric_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            metric_tx,
            event_tx,
            fail_next_metric: AtomicBool::new(false),
        });
        (handler, metric_rx, event_rx)
    }

    /// Makes the next `dispatch_metric` call fail (and drop the metric).
    pub fn fail_next_metric(&self) {
        self.fail_next_metric.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Handler for ChannelHandler {
    async fn dispatch_metric(&self, metric: Metric) -> Result<()> {
        if self.fail_next_metric.swap(false, Ordering::SeqCst) {
            return Err(Error::Fatal("simulated downstream failure".to_string()));
        }
        self.metric_tx
            .send(metric)
            .map_err(|_| Error::Fatal("metric receiver dropped".to_string()))
    }

    async fn dispatch_event(&self, event: Event) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| Error::Fatal("event receiver dropped".to_string()))
    }

    async fn wait_for_events(&self) {}
}

/// [`TokenAcquirer`] that never makes a lookup wait.
pub struct NoopLimiter;

#[async_trait]
impl TokenAcquirer for NoopLimiter {
    async fn acquire(&self) {}
}

/// [`TokenAcquirer`] that never grants a token. For cancellation tests.
pub struct BlockedLimiter;

#[async_trait]
impl TokenAcquirer for BlockedLimiter {
    async fn acquire(&self) {
        std::future::pending::<()>().await;
    }
}
