//! # Enrichment cache core
//!
//! Sits on the hot path of a metrics/events pipeline and attaches
//! cloud-provider-derived attributes (instance id, region, tags) to items
//! carrying a source address, amortizing provider calls through a TTL
//! cache.
//!
//! Architecture: shared fast path + single-owner event loop
//!
//! ```text
//! producers:
//!   dispatch_metric/dispatch_event -> cache read (shared lock)
//!        hit: enrich + forward inline     miss: handoff channel (1 slot)
//!                                                    |
//! EnricherWorker (single task, owns pending state):  v
//!   select! { handoffs | lookup results | refresh tick | shutdown }
//!     miss -> pending queue, first item schedules the address (LIFO)
//!     result -> install holder, spawn forward tasks for queued items
//!     tick -> evict idle entries, re-schedule expired ones
//!                       |
//! LookupDispatcher (single task):
//!   batch addresses -> one rate-limit token -> provider describe
//! ```
//!
//! # Design Principles
//!
//! - **Single owner**: the worker exclusively owns the pending queues and
//!   the pending-lookup buffer and is the only cache writer; holders are
//!   replaced, never mutated, apart from their atomic last-access stamp.
//! - **At most one in-flight lookup per address**: concurrent demand for
//!   one address coalesces onto its pending queue.
//! - **Ingest never blocks on the provider**: misses are queued and the
//!   producer returns at handoff; lookup errors never reach producers.

mod dispatcher;
mod enrich;
mod handler;
mod worker;

pub use enrich::apply_instance;
pub use handler::Enricher;
pub use worker::EnricherWorker;

#[cfg(test)]
mod handler_test;
