/// Tag prefix for the instance region attached during enrichment.
pub(crate) const REGION_TAG_PREFIX: &str = "region:";

// -
// Channel capacities

/// Metric/event handoff channels keep a single slot so that a producer
/// blocks while the worker is busy, instead of growing an unbounded queue.
pub(crate) const INGEST_CHANNEL_CAPACITY: usize = 1;

/// Dispatcher -> worker results channel.
pub(crate) const LOOKUP_RESULTS_CAPACITY: usize = 1;
