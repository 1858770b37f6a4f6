//! Core data types carried through the enrichment pipeline.

use std::fmt;
use std::sync::Arc;

/// Source network identifier of a metric or event, used as the cache key.
///
/// Addresses are opaque strings (an IP in the common case) and are cloned
/// freely between the pending queues, the lookup dispatcher and the cache,
/// so the backing storage is shared.
///
/// "No address available" is modelled as `Option<Address>` on the items
/// themselves; such items bypass the cache entirely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Arc<str>);

impl Address {
    pub fn new(addr: impl Into<Arc<str>>) -> Self {
        Address(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Address::new(addr)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Address::new(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Enrichment payload describing one cloud instance.
///
/// Returned by a successful provider lookup and shared behind an [`Arc`]
/// between the cache and in-flight forward tasks. Immutable after
/// publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Provider-assigned instance identifier, becomes the item hostname
    pub id: String,
    /// Region the instance runs in
    pub region: String,
    /// Instance tags, appended to items in order
    pub tags: Vec<String>,
}

/// Kind of a metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    Counter,
    #[default]
    Gauge,
    Timer,
    Set,
}

/// One metric sample flowing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub kind: MetricKind,
    /// Tag list, extended in place by enrichment
    pub tags: Vec<String>,
    /// Overwritten with the instance id on a positive cache hit
    pub hostname: String,
    /// Source address; `None` bypasses the cache
    pub source: Option<Address>,
}

/// One event flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    pub hostname: String,
    pub source: Option<Address>,
}
