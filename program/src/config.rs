// Donation Raffle - Configuration
use std::{path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::{RaffleError, RaffleResult};

/// Runtime settings for ticket pricing, donation detection and scheduling
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaffleConfig {
    /// In-game currency value of one ticket
    pub ticket_price: u64,
    /// Items priced below this are ignored when valuing a donation
    pub min_item_price: u64,
    /// Substring a donation message must contain to count
    pub trigger_message: String,
    /// Log kind identifying an item donation in the external log
    pub donation_log_kind: u32,
    /// Maximum number of log entries requested per poll
    pub log_fetch_limit: usize,
    /// Seconds between donation reconciliation passes
    pub reconcile_interval_secs: u64,
    /// Seconds between raffle expiry checks
    pub expiry_interval_secs: u64,
    /// Seconds between price cache refreshes
    pub price_refresh_interval_secs: u64,
    /// Seconds an admin has to confirm a destructive operation
    pub confirmation_timeout_secs: u64,
    /// Directory holding the persisted records
    pub data_dir: PathBuf,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            ticket_price: 400_000,
            min_item_price: 400_000,
            trigger_message: "LLF".to_string(),
            donation_log_kind: 4103,
            log_fetch_limit: 50,
            reconcile_interval_secs: 60,
            expiry_interval_secs: 60,
            price_refresh_interval_secs: 6 * 60 * 60,
            confirmation_timeout_secs: 30,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl RaffleConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> RaffleResult<Self> {
        let config: RaffleConfig =
            serde_json::from_str(raw).map_err(|e| RaffleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> RaffleResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RaffleError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> RaffleResult<()> {
        if self.ticket_price == 0 {
            return Err(RaffleError::InvalidConfig("ticket_price must be positive".into()));
        }
        if self.log_fetch_limit == 0 {
            return Err(RaffleError::InvalidConfig("log_fetch_limit must be positive".into()));
        }
        let intervals = [
            ("reconcile_interval_secs", self.reconcile_interval_secs),
            ("expiry_interval_secs", self.expiry_interval_secs),
            ("price_refresh_interval_secs", self.price_refresh_interval_secs),
            ("confirmation_timeout_secs", self.confirmation_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(RaffleError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}
