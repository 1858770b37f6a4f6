use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::limiter::TokenAcquirer;
use crate::provider::CloudProvider;
use crate::provider::LookupOutcome;
use crate::types::Address;

/// Completion of one address lookup, emitted back to the worker.
#[derive(Debug, Clone)]
pub(crate) struct LookupResult {
    pub(crate) address: Address,
    pub(crate) outcome: LookupOutcome,
}

/// Batches scheduled addresses and runs them through the rate-limited
/// cloud provider.
///
/// One long-running task: read one address, opportunistically drain more
/// up to the provider batch size, spend one rate-limit token on the whole
/// batch, look it up, emit one result per address.
pub(crate) struct LookupDispatcher {
    provider: Arc<dyn CloudProvider>,
    limiter: Arc<dyn TokenAcquirer>,
    to_lookup_rx: mpsc::Receiver<Address>,
    results_tx: mpsc::Sender<LookupResult>,
    shutdown: watch::Receiver<()>,
}

impl LookupDispatcher {
    pub(crate) fn new(
        provider: Arc<dyn CloudProvider>,
        limiter: Arc<dyn TokenAcquirer>,
        to_lookup_rx: mpsc::Receiver<Address>,
        results_tx: mpsc::Sender<LookupResult>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            provider,
            limiter,
            to_lookup_rx,
            results_tx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let first = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    info!("[LookupDispatcher] shutdown signal received.");
                    return;
                }
                address = self.to_lookup_rx.recv() => match address {
                    Some(address) => address,
                    // Worker dropped its sender: wind down.
                    None => return,
                },
            };

            let mut batch = vec![first];
            let max_batch = self.provider.max_batch_size().max(1);
            while batch.len() < max_batch {
                match self.to_lookup_rx.try_recv() {
                    Ok(address) => batch.push(address),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            debug!("Looking up batch of {} address(es)", batch.len());

            // One token per batch, not per address. A shutdown while
            // waiting abandons the batch; the next refresh pass will
            // re-schedule the addresses.
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    info!("[LookupDispatcher] shutdown while waiting for a token");
                    return;
                }
                _ = self.limiter.acquire() => {}
            }

            // A shutdown mid-lookup drops the provider call; the results
            // produced so far are simply never emitted.
            let outcomes = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    info!("[LookupDispatcher] shutdown during a lookup");
                    return;
                }
                outcomes = self.provider.describe_batch(batch.clone()) => match outcomes {
                    Ok(outcomes) => outcomes,
                    // A whole-batch failure counts against every address.
                    Err(e) => batch
                        .iter()
                        .map(|address| (address.clone(), LookupOutcome::Failed(e.clone())))
                        .collect(),
                },
            };

            for address in batch {
                let outcome = outcomes
                    .get(&address)
                    .cloned()
                    .unwrap_or(LookupOutcome::Absent);
                let result = LookupResult { address, outcome };
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return,
                    sent = self.results_tx.send(result) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
