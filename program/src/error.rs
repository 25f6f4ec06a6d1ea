// Donation Raffle - Errors
use thiserror::Error;

/// Errors that may be returned by raffle operations
#[derive(Error, Debug)]
pub enum RaffleError {
    /// No raffle is currently open
    #[error("No active raffle")]
    NoActiveRaffle,

    /// A raffle is already open; only one may run at a time
    #[error("Raffle already active")]
    RaffleAlreadyActive,

    /// Ticket amount was zero or would overflow the ticket space
    #[error("Invalid ticket amount")]
    InvalidAmount,

    /// Wallet does not hold enough tickets for the request
    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    /// The raffle closed without any tickets in the pool
    #[error("No tickets were sold")]
    NoTicketsSold,

    /// Chat identity has no linked game identity
    #[error("Account not linked")]
    NotLinked,

    /// Price or log source could not be reached or parsed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A record could not be durably written or read back
    #[error("Persistence failure on record `{key}`: {reason}")]
    PersistenceFailure { key: &'static str, reason: String },

    /// Admin confirmation was not received within the allowed window
    #[error("Confirmation timed out")]
    ConfirmationTimeout,

    /// Admin confirmation was explicitly refused
    #[error("Confirmation declined")]
    ConfirmationDeclined,

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RaffleError {
    /// Short message suitable for showing to the caller.
    ///
    /// Internal detail is never included, except upstream failure detail
    /// which is shown to admins only.
    pub fn user_message(&self, is_admin: bool) -> String {
        match self {
            RaffleError::NoActiveRaffle => "No active raffle.".to_string(),
            RaffleError::RaffleAlreadyActive => "Raffle already running.".to_string(),
            RaffleError::InvalidAmount => "Amount must be positive.".to_string(),
            RaffleError::InsufficientBalance { available, .. } => {
                format!("Insufficient funds! You have {} tickets.", available)
            }
            RaffleError::NoTicketsSold => "No tickets were sold. No winner.".to_string(),
            RaffleError::NotLinked => "Link your account first!".to_string(),
            RaffleError::UpstreamUnavailable(detail) if is_admin => {
                format!("Upstream service unavailable: {}", detail)
            }
            RaffleError::UpstreamUnavailable(_) => {
                "Upstream service unavailable, try again later.".to_string()
            }
            RaffleError::PersistenceFailure { .. } => {
                "Could not save changes, nothing was applied.".to_string()
            }
            RaffleError::ConfirmationTimeout => "Confirmation timed out, aborted.".to_string(),
            RaffleError::ConfirmationDeclined => "Confirmation declined, aborted.".to_string(),
            RaffleError::InvalidConfig(_) => "Service misconfigured.".to_string(),
        }
    }
}

/// Errors reported by the external price and log fetchers
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("upstream error {code}: {message}")]
    Api { code: i64, message: String },
}

impl From<SourceError> for RaffleError {
    fn from(e: SourceError) -> Self {
        RaffleError::UpstreamUnavailable(e.to_string())
    }
}

pub type RaffleResult<T> = Result<T, RaffleError>;
