use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;

use super::enrich::apply_instance;
use super::worker::EnricherWorker;
use crate::Error;
use crate::Result;
use crate::config::CacheConfig;
use crate::constants::INGEST_CHANNEL_CAPACITY;
use crate::handler::Handler;
use crate::limiter::TokenAcquirer;
use crate::provider::CloudProvider;
use crate::types::Address;
use crate::types::Event;
use crate::types::Instance;
use crate::types::Metric;
use crate::utils::EventTracker;

/// One cache entry: the lookup result for a single address.
///
/// Immutable after publication except for the last-access timestamp;
/// refreshes replace the whole entry instead of mutating it, since
/// concurrent readers may still hold the previous `Arc`.
#[derive(Debug)]
pub(crate) struct InstanceHolder {
    /// Nanoseconds since the enricher epoch, advanced on every cache hit
    last_access: AtomicU64,
    /// Absolute expiry; the refresh pass re-schedules a lookup after this
    expires: Instant,
    /// `None` is a negative result (lookup failed or no instance matched)
    instance: Option<Arc<Instance>>,
}

impl InstanceHolder {
    pub(crate) fn new(
        instance: Option<Arc<Instance>>,
        expires: Instant,
        last_access: u64,
    ) -> Self {
        Self {
            last_access: AtomicU64::new(last_access),
            expires,
            instance,
        }
    }

    /// Marks the entry as accessed. `fetch_max` keeps the timestamp
    /// monotonic under concurrent touches.
    pub(crate) fn touch(&self, now_nanos: u64) {
        self.last_access.fetch_max(now_nanos, Ordering::Relaxed);
    }

    pub(crate) fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    pub(crate) fn expires(&self) -> Instant {
        self.expires
    }

    pub(crate) fn instance(&self) -> Option<&Arc<Instance>> {
        self.instance.as_ref()
    }
}

/// State shared between the public dispatch surface, the worker and the
/// forward tasks it spawns.
pub(crate) struct Shared {
    pub(crate) cache_config: CacheConfig,
    pub(crate) provider: Arc<dyn CloudProvider>,
    pub(crate) next: Arc<dyn Handler>,
    pub(crate) limiter: Arc<dyn TokenAcquirer>,

    /// Address -> holder. The worker is the sole writer and takes the
    /// write lock only for single-entry replaces and batched eviction;
    /// the public fast path reads under the read lock.
    pub(crate) cache: RwLock<HashMap<Address, Arc<InstanceHolder>>>,

    /// In-flight event counter backing the drain barrier
    pub(crate) tracker: EventTracker,

    /// Origin for the atomic last-access timestamps
    epoch: Instant,

    metric_tx: mpsc::Sender<(Address, Metric)>,
    event_tx: mpsc::Sender<(Address, Event)>,
    shutdown: watch::Receiver<()>,
}

impl Shared {
    pub(crate) fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Fast-path cache read for an address already known to be present on
    /// the item. Returns `false` on a miss.
    fn enrich_from_cache(
        &self,
        address: &Address,
        tags: &mut Vec<String>,
        hostname: &mut String,
    ) -> bool {
        let holder = {
            let cache = self.cache.read();
            match cache.get(address) {
                Some(holder) => holder.clone(),
                None => return false,
            }
        };
        holder.touch(self.now_nanos());
        apply_instance(tags, hostname, holder.instance().map(Arc::as_ref));
        true
    }
}

/// Public dispatch surface of the enrichment cache.
///
/// Created together with its [`EnricherWorker`] via [`Enricher::new`];
/// the worker must be spawned (`tokio::spawn(worker.run())`) for misses
/// to resolve. Cheap to clone; all clones share one cache.
///
/// Implements [`Handler`], so an enricher slots between an upstream
/// producer and any downstream handler:
///
/// - cache hit: the item is enriched and forwarded synchronously, the
///   downstream result is returned to the producer;
/// - cache miss: the item is handed to the worker and `Ok` is returned;
///   delivery from that point is best effort;
/// - items without a source address skip the cache and are forwarded
///   as-is.
#[derive(Clone)]
pub struct Enricher {
    pub(crate) shared: Arc<Shared>,
}

impl Enricher {
    /// Builds the dispatch surface and its worker.
    ///
    /// `shutdown` is the embedding's shutdown signal: once it fires, the
    /// worker and its lookup dispatcher exit and dispatch calls return
    /// [`Error::Cancelled`]. Items still on pending queues at that point
    /// are discarded.
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        next: Arc<dyn Handler>,
        limiter: Arc<dyn TokenAcquirer>,
        cache_config: CacheConfig,
        shutdown: watch::Receiver<()>,
    ) -> (Enricher, EnricherWorker) {
        let (metric_tx, metric_rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            cache_config,
            provider,
            next,
            limiter,
            cache: RwLock::new(HashMap::new()),
            tracker: EventTracker::new(),
            epoch: Instant::now(),
            metric_tx,
            event_tx,
            shutdown: shutdown.clone(),
        });

        let worker = EnricherWorker::new(shared.clone(), metric_rx, event_rx, shutdown);
        (Enricher { shared }, worker)
    }
}

#[async_trait]
impl Handler for Enricher {
    async fn dispatch_metric(&self, mut metric: Metric) -> Result<()> {
        let Some(address) = metric.source.clone() else {
            // No source address: synthetic hit with an absent instance.
            return self.shared.next.dispatch_metric(metric).await;
        };
        if self
            .shared
            .enrich_from_cache(&address, &mut metric.tags, &mut metric.hostname)
        {
            return self.shared.next.dispatch_metric(metric).await;
        }

        let mut shutdown = self.shared.shutdown.clone();
        tokio::select! {
            _ = shutdown.changed() => Err(Error::Cancelled),
            sent = self.shared.metric_tx.send((address, metric)) => {
                sent.map_err(|_| Error::Cancelled)
            }
        }
    }

    async fn dispatch_event(&self, mut event: Event) -> Result<()> {
        let Some(address) = event.source.clone() else {
            return self.shared.next.dispatch_event(event).await;
        };
        if self
            .shared
            .enrich_from_cache(&address, &mut event.tags, &mut event.hostname)
        {
            return self.shared.next.dispatch_event(event).await;
        }

        // Count the event before the handoff so a drain started while it
        // sits on the channel still covers it.
        self.shared.tracker.add(1);
        let mut shutdown = self.shared.shutdown.clone();
        let result = tokio::select! {
            _ = shutdown.changed() => Err(Error::Cancelled),
            sent = self.shared.event_tx.send((address, event)) => {
                sent.map_err(|_| Error::Cancelled)
            }
        };
        if result.is_err() {
            self.shared.tracker.done(1);
        }
        result
    }

    async fn wait_for_events(&self) {
        self.shared.tracker.wait().await;
        self.shared.next.wait_for_events().await;
    }
}

#[cfg(test)]
impl Enricher {
    pub(crate) fn holder(&self, address: &Address) -> Option<Arc<InstanceHolder>> {
        self.shared.cache.read().get(address).cloned()
    }

    pub(crate) fn cache_len(&self) -> usize {
        self.shared.cache.read().len()
    }

    pub(crate) fn insert_holder(
        &self,
        address: Address,
        instance: Option<Arc<Instance>>,
        ttl: std::time::Duration,
    ) {
        let holder = InstanceHolder::new(instance, Instant::now() + ttl, self.shared.now_nanos());
        self.shared.cache.write().insert(address, Arc::new(holder));
    }
}
