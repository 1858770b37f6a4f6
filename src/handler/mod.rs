//! Forwarding interface between pipeline stages.
//!
//! A [`Handler`] accepts metrics and events and passes them to the next
//! stage. The enrichment cache both consumes this trait (the downstream
//! stage it forwards to) and implements it (the surface exposed to
//! upstream producers), so enrichers compose into a pipeline like any
//! other stage.

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::Result;
use crate::types::Event;
use crate::types::Metric;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Accepts one metric for processing.
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) when the
    /// metric was not accepted before shutdown; any other error means the
    /// stage rejected the item.
    async fn dispatch_metric(&self, metric: Metric) -> Result<()>;

    /// Accepts one event for processing. Same contract as
    /// [`dispatch_metric`](Handler::dispatch_metric).
    async fn dispatch_event(&self, event: Event) -> Result<()>;

    /// Barrier: resolves once every event accepted so far has been
    /// forwarded (or dropped due to cancellation), chaining through the
    /// whole pipeline.
    async fn wait_for_events(&self);
}
