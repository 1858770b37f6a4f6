//! Rate limiting of cloud provider lookups.
//!
//! The dispatcher acquires one token per lookup batch through the
//! [`TokenAcquirer`] trait. [`TokenBucket`] is the provided
//! implementation; embeddings with their own limiter (shared across
//! processes, adaptive, ...) implement the trait instead.

mod token_bucket;

pub use token_bucket::*;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenAcquirer: Send + Sync + 'static {
    /// Suspends until one token is available, then consumes it.
    ///
    /// Cancellation is the caller's `select!` against its shutdown signal:
    /// dropping this future consumes nothing.
    async fn acquire(&self);
}
