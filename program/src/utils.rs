// Donation Raffle - Utility Functions
use crate::state::{UnixTimestamp, SECONDS_PER_DAY};

/// Current wall-clock time as a Unix timestamp
pub fn now() -> UnixTimestamp {
    chrono::Utc::now().timestamp()
}

/// Auto-close time for a raffle running `duration_days` from `now`.
///
/// A zero duration is due immediately and closes on the next expiry check.
pub fn closing_time(now: UnixTimestamp, duration_days: u32) -> UnixTimestamp {
    now.saturating_add(i64::from(duration_days) * SECONDS_PER_DAY)
}

/// Format a currency amount with thousands separators (e.g. `1,250,000`)
pub fn format_currency(amount: u128) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a fraction in `[0, 1]` as a percentage with three decimals
pub fn format_percent(fraction: f64) -> String {
    format!("{:.3}%", fraction * 100.0)
}
