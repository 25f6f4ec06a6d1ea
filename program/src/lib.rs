// Donation Raffle
// Ticket ledger and winner selection for raffles funded by item donations

// Core modules
pub mod config;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod store;
pub mod utils;

// Raffle engine
pub mod draw;
pub mod reconciler;
pub mod scheduler;

// Collaborator contracts
pub mod source;

pub use config::RaffleConfig;
pub use error::{RaffleError, RaffleResult, SourceError};
pub use processor::{CloseOutcome, EntryReceipt, RaffleEvent, RaffleManager, ReconcileReport};
