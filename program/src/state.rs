// Donation Raffle - State
use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::{RaffleError, RaffleResult};

/// Seconds since the Unix epoch
pub type UnixTimestamp = i64;

/// Game-side identifier of a wallet owner
pub type ParticipantId = String;

/// External item identifier
pub type ItemId = u64;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Per-participant ticket balances and the donation log watermark
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq)]
pub struct WalletLedger {
    /// Highest external log timestamp already reconciled
    pub last_processed_timestamp: UnixTimestamp,
    /// Ticket balance per participant
    pub balances: BTreeMap<ParticipantId, u64>,
}

impl WalletLedger {
    /// Current balance, zero for unknown participants
    pub fn balance_of(&self, participant: &str) -> u64 {
        self.balances.get(participant).copied().unwrap_or(0)
    }

    /// Add tickets to a wallet, returning the new balance
    pub fn credit(&mut self, participant: &str, amount: u64) -> RaffleResult<u64> {
        if amount == 0 {
            return Err(RaffleError::InvalidAmount);
        }
        let balance = self
            .balance_of(participant)
            .checked_add(amount)
            .ok_or(RaffleError::InvalidAmount)?;
        self.balances.insert(participant.to_string(), balance);
        Ok(balance)
    }

    /// Remove tickets from a wallet, returning the new balance.
    ///
    /// Leaves the ledger untouched when the balance is short.
    pub fn debit(&mut self, participant: &str, amount: u64) -> RaffleResult<u64> {
        if amount == 0 {
            return Err(RaffleError::InvalidAmount);
        }
        let available = self.balance_of(participant);
        if available < amount {
            return Err(RaffleError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let balance = available - amount;
        self.balances.insert(participant.to_string(), balance);
        Ok(balance)
    }

    /// Move the watermark forward; never moves it back
    pub fn advance_watermark(&mut self, timestamp: UnixTimestamp) -> bool {
        if timestamp > self.last_processed_timestamp {
            self.last_processed_timestamp = timestamp;
            true
        } else {
            false
        }
    }

    /// Wipe every balance while keeping the watermark
    pub fn reset_balances(&mut self) -> usize {
        let wiped = self.balances.len();
        self.balances.clear();
        wiped
    }
}

/// One contiguous allocation of ticket numbers
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct TicketRange {
    pub participant_id: ParticipantId,
    /// First ticket number, inclusive
    pub range_start: u64,
    /// Last ticket number, inclusive
    pub range_end: u64,
}

impl TicketRange {
    pub fn ticket_count(&self) -> u64 {
        self.range_end - self.range_start + 1
    }

    pub fn contains(&self, ticket: u64) -> bool {
        self.range_start <= ticket && ticket <= self.range_end
    }
}

/// The active raffle: prize metadata and the ticket allocation table
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq)]
pub struct RafflePool {
    /// Display name of the prize, including quantity
    pub prize_label: String,
    /// Item id of the prize, for display only
    pub prize_item_id: ItemId,
    /// Allocations in admission order
    pub entries: Vec<TicketRange>,
    /// End of the last allocation, zero when empty
    pub total_tickets: u64,
    /// Auto-close time; records stored without one only close manually
    pub closes_at: Option<UnixTimestamp>,
    /// Where results for this raffle should be posted
    pub origin_channel: String,
}

impl RafflePool {
    /// Create an empty pool
    pub fn new(
        prize_label: String,
        prize_item_id: ItemId,
        closes_at: Option<UnixTimestamp>,
        origin_channel: String,
    ) -> Self {
        Self {
            prize_label,
            prize_item_id,
            entries: Vec::new(),
            total_tickets: 0,
            closes_at,
            origin_channel,
        }
    }

    /// Append the next `ticket_count` numbers to the pool for `participant`
    pub fn allocate(&mut self, participant: &str, ticket_count: u64) -> RaffleResult<TicketRange> {
        if ticket_count == 0 {
            return Err(RaffleError::InvalidAmount);
        }
        let range_end = self
            .total_tickets
            .checked_add(ticket_count)
            .ok_or(RaffleError::InvalidAmount)?;
        let range = TicketRange {
            participant_id: participant.to_string(),
            range_start: self.total_tickets + 1,
            range_end,
        };
        self.entries.push(range.clone());
        self.total_tickets = range_end;
        Ok(range)
    }

    /// Allocation holding `ticket`, if it lies in `[1, total_tickets]`
    pub fn owner_of(&self, ticket: u64) -> Option<&TicketRange> {
        if ticket == 0 || ticket > self.total_tickets {
            return None;
        }
        // Ranges are sorted and contiguous, so the first range ending at or
        // after the ticket is the one holding it.
        let idx = self.entries.partition_point(|e| e.range_end < ticket);
        self.entries.get(idx).filter(|e| e.contains(ticket))
    }

    /// Total tickets a participant holds across all of their allocations
    pub fn tickets_held_by(&self, participant: &str) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.participant_id == participant)
            .map(TicketRange::ticket_count)
            .sum()
    }

    pub fn has_expired(&self, now: UnixTimestamp) -> bool {
        matches!(self.closes_at, Some(closes_at) if now >= closes_at)
    }

    /// Check the allocation table partitions `[1, total_tickets]`
    pub fn is_consistent(&self) -> bool {
        let mut next = 1u64;
        for entry in &self.entries {
            if entry.range_start != next || entry.range_end < entry.range_start {
                return false;
            }
            next = match entry.range_end.checked_add(1) {
                Some(n) => n,
                None => return false,
            };
        }
        next - 1 == self.total_tickets
    }
}

/// Prize display name, prefixed with the quantity when more than one
pub fn prize_display_label(prize: &str, quantity: u32) -> String {
    if quantity > 1 {
        format!("{}x {}", quantity, prize)
    } else {
        prize.to_string()
    }
}

/// Upstream listing of one item's market data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemListing {
    pub item_id: ItemId,
    pub market_value: u64,
    pub buy_price: u64,
}

/// Unit price per item, replaced as a whole on every refresh
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq)]
pub struct PriceCache {
    pub prices: BTreeMap<ItemId, u64>,
}

impl PriceCache {
    /// Build from an upstream listing; market value wins, buy price is the fallback
    pub fn from_listing<I>(listing: I) -> Self
    where
        I: IntoIterator<Item = ItemListing>,
    {
        let prices = listing
            .into_iter()
            .map(|item| {
                let price = if item.market_value == 0 {
                    item.buy_price
                } else {
                    item.market_value
                };
                (item.item_id, price)
            })
            .collect();
        Self { prices }
    }

    /// Unit price, zero for unknown items
    pub fn unit_price(&self, item_id: ItemId) -> u64 {
        self.prices.get(&item_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Chat identity to game identity mapping
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq)]
pub struct LinkTable {
    pub links: BTreeMap<String, ParticipantId>,
}

impl LinkTable {
    /// Insert or replace a link, returning the previous game identity
    pub fn link(&mut self, chat_id: &str, game_id: &str) -> Option<ParticipantId> {
        self.links.insert(chat_id.to_string(), game_id.to_string())
    }

    pub fn game_identity(&self, chat_id: &str) -> RaffleResult<&ParticipantId> {
        self.links.get(chat_id).ok_or(RaffleError::NotLinked)
    }

    pub fn chat_identity_of(&self, game_id: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|(_, linked)| linked.as_str() == game_id)
            .map(|(chat, _)| chat.as_str())
    }
}

/// One item line of a donation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonatedItem {
    pub item_id: ItemId,
    pub quantity: u64,
}

/// Entry from the external transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationEvent {
    pub timestamp: UnixTimestamp,
    pub sender_id: ParticipantId,
    pub log_kind: u32,
    pub message: String,
    pub items: Vec<DonatedItem>,
}

impl DonationEvent {
    /// Whether this entry is a raffle donation
    pub fn qualifies(&self, log_kind: u32, trigger_message: &str) -> bool {
        self.log_kind == log_kind && self.message.contains(trigger_message)
    }
}
