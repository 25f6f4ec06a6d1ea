// Donation Raffle - Draw Engine
use rand::Rng;

use crate::{
    error::{RaffleError, RaffleResult},
    state::{ItemId, ParticipantId, RafflePool},
    store::RAFFLE_KEY,
};

/// Outcome of a completed draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawResult {
    pub winning_ticket: u64,
    pub winner_id: ParticipantId,
    /// Tickets the winner held across all of their entries
    pub winner_tickets: u64,
    pub total_tickets: u64,
    pub prize_label: String,
    pub prize_item_id: ItemId,
    pub origin_channel: String,
}

impl DrawResult {
    /// Fraction of the pool the winner held, in `(0, 1]`
    pub fn winner_share(&self) -> f64 {
        self.winner_tickets as f64 / self.total_tickets as f64
    }

    pub fn win_chance_percent(&self) -> f64 {
        self.winner_share() * 100.0
    }
}

/// Resolve a ticket number to its owner and that owner's share of the pool
pub fn resolve_winner(pool: &RafflePool, winning_ticket: u64) -> Option<DrawResult> {
    let entry = pool.owner_of(winning_ticket)?;
    Some(DrawResult {
        winning_ticket,
        winner_id: entry.participant_id.clone(),
        winner_tickets: pool.tickets_held_by(&entry.participant_id),
        total_tickets: pool.total_tickets,
        prize_label: pool.prize_label.clone(),
        prize_item_id: pool.prize_item_id,
        origin_channel: pool.origin_channel.clone(),
    })
}

/// Draw a ticket uniformly from `[1, total_tickets]` and resolve its owner
pub fn draw_winner<R: Rng>(pool: &RafflePool, rng: &mut R) -> RaffleResult<DrawResult> {
    if pool.total_tickets == 0 {
        return Err(RaffleError::NoTicketsSold);
    }
    let winning_ticket = rng.gen_range(1..=pool.total_tickets);

    resolve_winner(pool, winning_ticket).ok_or_else(|| RaffleError::PersistenceFailure {
        key: RAFFLE_KEY,
        reason: format!("ticket #{} has no owner", winning_ticket),
    })
}
