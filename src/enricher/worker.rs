use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::dispatcher::LookupDispatcher;
use super::dispatcher::LookupResult;
use super::enrich::apply_instance;
use super::handler::InstanceHolder;
use super::handler::Shared;
use crate::Result;
use crate::constants::LOOKUP_RESULTS_CAPACITY;
use crate::provider::LookupOutcome;
use crate::types::Address;
use crate::types::Event;
use crate::types::Instance;
use crate::types::Metric;

/// Single-owner event loop of the enrichment cache.
///
/// The worker exclusively owns the pending queues and the pending-lookup
/// buffer, and is the only writer of the cache map. It multiplexes ingest
/// handoffs, lookup completions and the periodic refresh tick over one
/// task, so none of that state needs a lock of its own.
pub struct EnricherWorker {
    shared: Arc<Shared>,
    metric_rx: mpsc::Receiver<(Address, Metric)>,
    event_rx: mpsc::Receiver<(Address, Event)>,

    /// Per-address items waiting for an in-flight lookup
    awaiting_metrics: HashMap<Address, Vec<Metric>>,
    awaiting_events: HashMap<Address, Vec<Event>>,

    /// Addresses scheduled for the dispatcher, served LIFO: the newest
    /// demand is looked up first, refresh traffic waits behind it
    to_lookup: Vec<Address>,

    shutdown: watch::Receiver<()>,
}

impl EnricherWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        metric_rx: mpsc::Receiver<(Address, Metric)>,
        event_rx: mpsc::Receiver<(Address, Event)>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            shared,
            metric_rx,
            event_rx,
            awaiting_metrics: HashMap::new(),
            awaiting_events: HashMap::new(),
            to_lookup: Vec::new(),
            shutdown,
        }
    }

    /// Runs the event loop until the shutdown signal fires.
    ///
    /// Spawns the lookup dispatcher task and waits for it on the way out.
    /// Items still on pending queues when the loop exits are discarded;
    /// their producers already received `Ok` at handoff (best-effort
    /// delivery).
    pub async fn run(mut self) -> Result<()> {
        info!(
            "[Enricher] worker started (provider: {})",
            self.shared.provider.name()
        );

        // The dispatcher drains this channel into batches, so its capacity
        // is exactly one provider batch.
        let (to_lookup_tx, to_lookup_rx) =
            mpsc::channel(self.shared.provider.max_batch_size().max(1));
        let (results_tx, mut results_rx) = mpsc::channel(LOOKUP_RESULTS_CAPACITY);

        let dispatcher = LookupDispatcher::new(
            self.shared.provider.clone(),
            self.shared.limiter.clone(),
            to_lookup_rx,
            results_tx,
            self.shutdown.clone(),
        );
        let dispatcher_handle = tokio::spawn(dispatcher.run());

        let refresh_period = self.shared.cache_config.refresh_period();
        let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // One-slot holding register for the address currently offered to
        // the dispatcher. While it is occupied the send branch below is
        // armed; the loop keeps servicing every other input meanwhile.
        let mut parked: Option<Address> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    info!("[Enricher] shutdown signal received.");
                    break;
                }

                permit = to_lookup_tx.reserve(), if parked.is_some() => {
                    match permit {
                        Ok(permit) => {
                            if let Some(address) = parked.take() {
                                permit.send(address);
                            }
                        }
                        Err(_) => {
                            error!("[Enricher] lookup dispatcher stopped unexpectedly");
                            break;
                        }
                    }
                }

                Some(result) = results_rx.recv() => {
                    self.handle_lookup_result(result);
                }

                _ = refresh.tick() => {
                    self.do_refresh(Instant::now());
                }

                Some((address, metric)) = self.metric_rx.recv() => {
                    self.handle_metric(address, metric);
                }

                Some((address, event)) = self.event_rx.recv() => {
                    self.handle_event(address, event);
                }
            }

            if parked.is_none() {
                parked = self.to_lookup.pop();
            }
        }

        // Close the dispatcher's inputs and wait for it to wind down.
        drop(to_lookup_tx);
        drop(results_rx);
        if let Err(e) = dispatcher_handle.await {
            error!("Lookup dispatcher task failed: {e:?}");
        }

        // Discarded events must still leave the drain barrier; their
        // producers already returned at handoff (best-effort delivery).
        self.event_rx.close();
        let mut discarded = 0i64;
        while self.event_rx.try_recv().is_ok() {
            discarded += 1;
        }
        for events in self.awaiting_events.values() {
            discarded += events.len() as i64;
        }
        self.awaiting_events.clear();
        if discarded > 0 {
            debug!("Discarding {discarded} pending event(s) on shutdown");
            self.shared.tracker.done(discarded);
        }
        Ok(())
    }

    /// Ingest path for one metric that missed the public fast path.
    ///
    /// The cache may have been primed while the metric sat on the handoff
    /// channel, so it is checked again here.
    fn handle_metric(&mut self, address: Address, metric: Metric) {
        let holder = { self.shared.cache.read().get(&address).cloned() };
        match holder {
            Some(holder) => {
                holder.touch(self.shared.now_nanos());
                let instance = holder.instance().cloned();
                tokio::spawn(forward_metrics(self.shared.clone(), instance, vec![metric]));
            }
            None => {
                let queue = self.awaiting_metrics.entry(address.clone()).or_default();
                queue.push(metric);
                if queue.len() == 1 {
                    // First item for this address: schedule exactly one
                    // lookup. Later items coalesce onto the queue.
                    self.to_lookup.push(address);
                }
            }
        }
    }

    fn handle_event(&mut self, address: Address, event: Event) {
        let holder = { self.shared.cache.read().get(&address).cloned() };
        match holder {
            Some(holder) => {
                holder.touch(self.shared.now_nanos());
                let instance = holder.instance().cloned();
                tokio::spawn(forward_events(self.shared.clone(), instance, vec![event]));
            }
            None => {
                let queue = self.awaiting_events.entry(address.clone()).or_default();
                queue.push(event);
                if queue.len() == 1 {
                    self.to_lookup.push(address);
                }
            }
        }
    }

    /// Installs a holder for a completed lookup and releases every item
    /// buffered for its address.
    fn handle_lookup_result(&mut self, result: LookupResult) {
        let LookupResult { address, outcome } = result;

        let (instance, failed) = match outcome {
            LookupOutcome::Found(instance) => (Some(instance), false),
            LookupOutcome::Absent => (None, false),
            LookupOutcome::Failed(e) => {
                info!("Error retrieving instance details for {address}: {e}");
                (None, true)
            }
        };

        let ttl = if failed {
            self.shared.cache_config.negative_ttl()
        } else {
            self.shared.cache_config.positive_ttl()
        };
        let now_nanos = self.shared.now_nanos();

        let previous = { self.shared.cache.read().get(&address).cloned() };
        let (last_access, instance) = match previous {
            None => (now_nanos, instance),
            Some(previous) => {
                // A transient lookup failure must not destroy a good
                // cached enrichment.
                let instance = if failed {
                    previous.instance().cloned()
                } else {
                    instance
                };
                (previous.last_access(), instance)
            }
        };

        let holder = Arc::new(InstanceHolder::new(
            instance.clone(),
            Instant::now() + ttl,
            last_access,
        ));
        {
            self.shared.cache.write().insert(address.clone(), holder);
        }

        if let Some(metrics) = self.awaiting_metrics.remove(&address) {
            tokio::spawn(forward_metrics(
                self.shared.clone(),
                instance.clone(),
                metrics,
            ));
        }
        if let Some(events) = self.awaiting_events.remove(&address) {
            tokio::spawn(forward_events(self.shared.clone(), instance, events));
        }
    }

    /// One pass over the cache: drop idle entries, schedule a refresh for
    /// expired ones. An entry both idle and expired is only dropped.
    fn do_refresh(&mut self, now: Instant) {
        let now_nanos = self.shared.now_nanos();
        let idle_nanos = self.shared.cache_config.evict_after_idle().as_nanos() as u64;

        let mut to_delete = Vec::new();
        {
            let cache = self.shared.cache.read();
            for (address, holder) in cache.iter() {
                if now_nanos.saturating_sub(holder.last_access()) > idle_nanos {
                    to_delete.push(address.clone());
                } else if now > holder.expires() {
                    self.to_lookup.push(address.clone());
                }
            }
        }

        if !to_delete.is_empty() {
            debug!("Evicting {} idle cache entries", to_delete.len());
            let mut cache = self.shared.cache.write();
            for address in &to_delete {
                cache.remove(address);
            }
        }
    }
}

/// Enriches and forwards metrics released from a pending queue (or a
/// primed-while-queued hit). One task per batch keeps batch order.
async fn forward_metrics(
    shared: Arc<Shared>,
    instance: Option<Arc<Instance>>,
    metrics: Vec<Metric>,
) {
    for mut metric in metrics {
        apply_instance(&mut metric.tags, &mut metric.hostname, instance.as_deref());
        if let Err(e) = shared.next.dispatch_metric(metric).await {
            if e.is_cancelled() {
                return;
            }
            warn!("Failed to forward metric: {e}");
        }
    }
}

/// Event counterpart of [`forward_metrics`]. Releases the whole batch
/// from the in-flight tracker on the way out, including events dropped by
/// a cancelled downstream, so the drain barrier cannot hang on them.
async fn forward_events(shared: Arc<Shared>, instance: Option<Arc<Instance>>, events: Vec<Event>) {
    let total = events.len() as i64;
    for mut event in events {
        apply_instance(&mut event.tags, &mut event.hostname, instance.as_deref());
        if let Err(e) = shared.next.dispatch_event(event).await {
            if e.is_cancelled() {
                break;
            }
            warn!("Failed to forward event: {e}");
        }
    }
    shared.tracker.done(total);
}
