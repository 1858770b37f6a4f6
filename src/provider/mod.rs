//! Cloud provider lookup interface.
//!
//! A [`CloudProvider`] answers batched "describe these addresses" queries.
//! The concrete client (AWS, GCP, a fake in tests) lives outside this
//! crate; the enrichment core only depends on this trait.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::types::Address;
use crate::types::Instance;

/// Per-address disposition of a batch lookup.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// The provider knows the address and returned its instance
    Found(Arc<Instance>),
    /// The lookup succeeded but no instance matched the address
    Absent,
    /// The lookup failed for this address
    Failed(ProviderError),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    /// Provider name, used in log lines only.
    fn name(&self) -> &'static str;

    /// Maximum number of addresses one `describe_batch` call accepts.
    /// Must be positive; the dispatcher sizes its inbound channel with it.
    fn max_batch_size(&self) -> usize;

    /// Looks up a batch of addresses.
    ///
    /// Addresses missing from the returned map are treated as
    /// [`LookupOutcome::Absent`]. A top-level `Err` is a whole-batch
    /// failure and is applied to every address in the batch.
    async fn describe_batch(
        &self,
        addresses: Vec<Address>,
    ) -> std::result::Result<HashMap<Address, LookupOutcome>, ProviderError>;
}
