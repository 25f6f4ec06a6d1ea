// Donation Raffle - External collaborators
use std::future::Future;

use crate::{
    error::SourceError,
    processor::RaffleEvent,
    state::{DonationEvent, ItemListing, UnixTimestamp},
};

/// Supplies the current market listing of every item
pub trait PriceSource: Send + Sync {
    fn fetch_prices(&self) -> impl Future<Output = Result<Vec<ItemListing>, SourceError>> + Send;
}

/// Supplies external log entries newer than a timestamp.
///
/// Entries may come back in any order; the reconciler sorts them.
pub trait LogSource: Send + Sync {
    fn fetch_since(
        &self,
        since: UnixTimestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DonationEvent>, SourceError>> + Send;
}

/// Receives notifications produced by scheduled operations
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RaffleEvent) -> impl Future<Output = ()> + Send;
}
