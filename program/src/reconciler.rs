// Donation Raffle - Donation Reconciler
//
// Converts external donation log entries into wallet credits. The ledger's
// watermark only ever moves forward, so a log entry is credited at most once.
use tracing::{debug, warn};

use crate::{
    config::RaffleConfig,
    state::{DonationEvent, ParticipantId, PriceCache, UnixTimestamp, WalletLedger},
};

/// A credit applied for one qualifying donation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub timestamp: UnixTimestamp,
    pub sender_id: ParticipantId,
    /// Tickets granted for the donation
    pub tickets: u64,
    /// Value of the counted items, in in-game currency
    pub total_value: u128,
    /// Sender's balance after the credit
    pub new_balance: u64,
}

/// Result of applying one batch of log entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub deposits: Vec<Deposit>,
    /// Entries newer than the watermark that were examined
    pub entries_processed: usize,
    /// Entries that matched the donation kind and trigger message
    pub qualifying_entries: usize,
    /// Whether the ledger changed and must be persisted
    pub ledger_dirty: bool,
}

/// Value of a donation, counting only items priced at or above the minimum
pub fn donation_value(event: &DonationEvent, prices: &PriceCache, min_item_price: u64) -> u128 {
    event
        .items
        .iter()
        .filter_map(|item| {
            let price = prices.unit_price(item.item_id);
            if price < min_item_price {
                return None;
            }
            Some(price as u128 * item.quantity as u128)
        })
        .sum()
}

/// Whole tickets bought by `value`
pub fn tickets_for_value(value: u128, ticket_price: u64) -> u64 {
    if ticket_price == 0 {
        return 0;
    }
    u64::try_from(value / ticket_price as u128).unwrap_or(u64::MAX)
}

/// Apply a batch of log entries to the ledger.
///
/// Entries at or below the watermark held when the pass starts are ignored.
/// The rest are handled in timestamp order, ties kept in fetch order, and
/// every one of them advances the watermark whether or not it qualifies.
pub fn reconcile(
    ledger: &mut WalletLedger,
    mut events: Vec<DonationEvent>,
    prices: &PriceCache,
    config: &RaffleConfig,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let watermark = ledger.last_processed_timestamp;

    events.sort_by_key(|e| e.timestamp);

    for event in events.iter().filter(|e| e.timestamp > watermark) {
        ledger.advance_watermark(event.timestamp);
        outcome.entries_processed += 1;
        outcome.ledger_dirty = true;

        if !event.qualifies(config.donation_log_kind, &config.trigger_message) {
            continue;
        }
        outcome.qualifying_entries += 1;

        let total_value = donation_value(event, prices, config.min_item_price);
        let tickets = tickets_for_value(total_value, config.ticket_price);
        if tickets == 0 {
            debug!(
                sender = %event.sender_id,
                total_value,
                "donation below ticket price"
            );
            continue;
        }

        match ledger.credit(&event.sender_id, tickets) {
            Ok(new_balance) => outcome.deposits.push(Deposit {
                timestamp: event.timestamp,
                sender_id: event.sender_id.clone(),
                tickets,
                total_value,
                new_balance,
            }),
            Err(e) => warn!(sender = %event.sender_id, tickets, error = %e, "credit rejected"),
        }
    }

    outcome
}
