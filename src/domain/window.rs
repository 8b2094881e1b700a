use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-account cooldown window for one reward contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimWindow {
    /// Seconds since epoch of the last claim, 0 if the account never claimed
    pub last_claim_timestamp: u64,
    pub cooldown_secs: u64,
}

impl ClaimWindow {
    pub fn new(last_claim_timestamp: u64, cooldown_secs: u64) -> Self {
        Self {
            last_claim_timestamp,
            cooldown_secs,
        }
    }

    pub fn has_claimed_before(&self) -> bool {
        self.last_claim_timestamp != 0
    }

    /// `None` for first-time claimants, who are never gated.
    pub fn next_eligible_timestamp(&self) -> Option<u64> {
        self.has_claimed_before()
            .then(|| self.last_claim_timestamp.saturating_add(self.cooldown_secs))
    }
}

/// Time left until the window reopens, split for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub total_seconds: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Countdown {
    pub fn from_seconds(total_seconds: u64) -> Self {
        Self {
            total_seconds,
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
        }
    }

    /// Compact form used on claim buttons, e.g. "23h 59m"
    pub fn short(&self) -> String {
        format!("{}h {}m", self.hours, self.minutes)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m {}s", self.hours, self.minutes, self.seconds)
    }
}
