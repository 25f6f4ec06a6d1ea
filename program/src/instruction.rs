// Donation Raffle - Instructions
use crate::{
    draw::DrawResult,
    processor::EntryReceipt,
    state::{ItemId, RafflePool},
};

/// Requests the presentation layer can dispatch through
/// [`RaffleManager::process`](crate::processor::RaffleManager::process)
#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Open a new raffle (admin only)
    ///
    /// Fails with `RaffleAlreadyActive` while another raffle is open.
    StartRaffle {
        /// Prize name shown to entrants
        prize: String,
        /// Item id of the prize, for display
        prize_item_id: ItemId,
        /// Number of prize items; values above one prefix the label
        quantity: u32,
        /// Days until the raffle closes itself, zero to close on the next expiry check
        duration_days: u32,
        /// Where the result should be posted
        origin_channel: String,
    },

    /// Spend wallet tickets on the active raffle
    ///
    /// The caller is identified by chat identity and must be linked.
    EnterRaffle {
        chat_id: String,
        /// Tickets to move from the wallet into the pool
        ticket_count: u64,
    },

    /// Close the active raffle and draw a winner (admin only)
    CloseRaffle {},

    /// Wallet balance of a linked chat identity
    BalanceOf { chat_id: String },

    /// Tickets a linked chat identity holds in the active pool
    TicketsInPool { chat_id: String },

    /// Link a chat identity to a game identity
    LinkAccount { chat_id: String, game_id: String },
}

/// Successful result of a dispatched instruction
#[derive(Clone, Debug, PartialEq)]
pub enum RaffleOutcome {
    Started(RafflePool),
    Entered(EntryReceipt),
    Closed(DrawResult),
    Balance(u64),
    PoolTickets(u64),
    Linked {
        /// Game identity the chat identity was linked to before, if any
        previous: Option<String>,
    },
}
