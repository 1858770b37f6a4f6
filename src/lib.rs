//! # cloud-enrich
//!
//! Cloud-metadata enrichment cache for metrics/events pipelines.
//!
//! For each incoming metric or event carrying a source network address,
//! the cache attaches cloud-provider-derived attributes (instance id,
//! region, instance tags) before forwarding the item downstream. Provider
//! calls are amortized through a TTL cache, serialized behind a
//! token-bucket rate limiter, and never block ingest.
//!
//! ## What this crate provides
//!
//! - **Enrichment core** - [`Enricher`] / [`EnricherWorker`]: the public
//!   dispatch surface and its single-owner event loop
//! - **Batched, rate-limited lookups** - concurrent demand for one
//!   address coalesces into a single in-flight provider call
//! - **Refresh and eviction** - distinct TTLs for positive and negative
//!   results, idle-based eviction independent of expiry
//! - **Token bucket** - a [`TokenBucket`] limiter; bring your own via
//!   [`TokenAcquirer`]
//!
//! The concrete cloud client ([`CloudProvider`]), the downstream stage
//! ([`Handler`]) and process bootstrap are **your responsibility**.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │   Your ingest pipeline          │
//! ├─────────────────────────────────┤
//! │   cloud-enrich (cache + loop)   │  ← You are here
//! ├─────────────────────────────────┤
//! │   Your provider │ Your handler  │  ← You implement
//! └─────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use cloud_enrich::{Enricher, EnricherConfig, Handler, TokenBucket};
//! use tokio::sync::watch;
//!
//! let config = EnricherConfig::new()?.validate()?;
//! let limiter = Arc::new(TokenBucket::from_config(&config.limiter));
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//!
//! // provider: Arc<dyn CloudProvider>, next: Arc<dyn Handler>
//! let (enricher, worker) = Enricher::new(provider, next, limiter, config.cache, shutdown_rx);
//! tokio::spawn(worker.run());
//!
//! enricher.dispatch_metric(metric).await?;
//! // ... on shutdown:
//! shutdown_tx.send(()).ok();
//! enricher.wait_for_events().await;
//! ```

pub mod config;
pub mod enricher;
pub mod handler;
pub mod limiter;
pub mod provider;
pub mod test_utils;
pub mod types;

mod constants;
mod errors;
mod utils;

pub use config::*;
pub use enricher::*;
pub use errors::*;
pub use handler::*;
pub use limiter::*;
pub use provider::*;
pub use types::*;
