use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ClaimFailure;

/// Claim session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// No claim in progress
    Idle,
    /// Claim requested, waiting for a wallet connection
    AwaitingConnection,
    /// Connected on another chain, waiting for the switch to land
    AwaitingChainSwitch,
    /// Claim transaction handed to the wallet, waiting for acceptance
    Submitted,
    /// Transaction broadcast, waiting for inclusion in a block
    Confirming,
    /// Receipt received with success status
    Confirmed,
    /// Attempt ended without a successful receipt
    Failed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Idle => "IDLE",
            ClaimStatus::AwaitingConnection => "AWAITING_CONNECTION",
            ClaimStatus::AwaitingChainSwitch => "AWAITING_CHAIN_SWITCH",
            ClaimStatus::Submitted => "SUBMITTED",
            ClaimStatus::Confirming => "CONFIRMING",
            ClaimStatus::Confirmed => "CONFIRMED",
            ClaimStatus::Failed => "FAILED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: ClaimStatus) -> bool {
        use ClaimStatus::*;

        match (self, target) {
            // From Idle: first step depends on the wallet at claim time
            (Idle, AwaitingConnection) => true,
            (Idle, AwaitingChainSwitch) => true,
            (Idle, Submitted) => true,
            (Idle, Failed) => true, // Pre-submission check failed for a ready wallet

            // From AwaitingConnection
            (AwaitingConnection, AwaitingChainSwitch) => true, // Connected on wrong chain
            (AwaitingConnection, Submitted) => true,           // Connected on target chain
            (AwaitingConnection, Failed) => true,              // Timeout / wallet error
            (AwaitingConnection, Idle) => true,                // Rejected / cancelled

            // From AwaitingChainSwitch
            (AwaitingChainSwitch, Submitted) => true, // Switch landed
            (AwaitingChainSwitch, Failed) => true,    // Switch failed
            (AwaitingChainSwitch, Idle) => true,      // Context changed / cancelled

            // From Submitted
            (Submitted, Confirming) => true, // Wallet accepted the transaction
            (Submitted, Failed) => true,     // Revert on estimate / network error
            (Submitted, Idle) => true,       // User rejected / stale context

            // From Confirming
            (Confirming, Confirmed) => true,
            (Confirming, Failed) => true,
            (Confirming, Idle) => true, // Stale context

            // Cool-off done
            (Confirmed, Idle) => true,
            (Failed, Idle) => true,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<ClaimStatus> {
        use ClaimStatus::*;

        match self {
            Idle => vec![AwaitingConnection, AwaitingChainSwitch, Submitted, Failed],
            AwaitingConnection => vec![AwaitingChainSwitch, Submitted, Failed, Idle],
            AwaitingChainSwitch => vec![Submitted, Failed, Idle],
            Submitted => vec![Confirming, Failed, Idle],
            Confirming => vec![Confirmed, Failed, Idle],
            Confirmed => vec![Idle],
            Failed => vec![Idle],
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ClaimStatus::Idle)
    }

    /// Waiting on a wallet precondition; nothing has touched the chain yet.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            ClaimStatus::AwaitingConnection | ClaimStatus::AwaitingChainSwitch
        )
    }

    /// A transaction may exist and cannot be cancelled.
    pub fn has_transaction(&self) -> bool {
        matches!(self, ClaimStatus::Submitted | ClaimStatus::Confirming)
    }

    /// Outcome reached, waiting out the display window
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Confirmed | ClaimStatus::Failed)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of an in-flight claim: one per (account, contract)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chain_id: u64,
    pub contract: Address,
    pub account: Address,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.chain_id, self.contract, self.account)
    }
}

/// What the chain reported for a confirmed claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// Amount from the `Claimed` event, when the log was decodable
    pub claimed_amount: Option<U256>,
}

/// One claim attempt, published through the orchestrator's status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSession {
    /// `None` while idle
    pub id: Option<Uuid>,
    pub status: ClaimStatus,
    pub chain_id: u64,
    /// Account the attempt is bound to, once connected
    pub account: Option<Address>,
    pub tx_hash: Option<TxHash>,
    pub error: Option<ClaimFailure>,
    pub receipt: Option<ClaimReceipt>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimSession {
    pub fn idle(chain_id: u64) -> Self {
        Self {
            id: None,
            status: ClaimStatus::Idle,
            chain_id,
            account: None,
            tx_hash: None,
            error: None,
            receipt: None,
            started_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn begin(id: Uuid, status: ClaimStatus, chain_id: u64, account: Option<Address>) -> Self {
        let now = Utc::now();
        Self {
            id: Some(id),
            status,
            chain_id,
            account,
            tx_hash: None,
            error: None,
            receipt: None,
            started_at: Some(now),
            updated_at: now,
        }
    }

    /// No attempt in progress, not even a pending pre-submission check
    pub fn is_idle(&self) -> bool {
        self.status.is_idle() && self.id.is_none()
    }

    /// Reserved by a ready-wallet claim whose window check has not finished
    pub fn is_checking(&self) -> bool {
        self.status.is_idle() && self.id.is_some()
    }

    pub fn belongs_to(&self, id: Uuid) -> bool {
        self.id == Some(id)
    }

    /// The error worth showing: silent rejections are filtered out
    pub fn visible_error(&self) -> Option<&ClaimFailure> {
        self.error.as_ref().filter(|e| !e.is_silent())
    }
}

/// Session transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub session_id: Option<Uuid>,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionTransition {
    pub fn new(
        session_id: Option<Uuid>,
        from: ClaimStatus,
        to: ClaimStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            from,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use ClaimStatus::*;

        assert!(Idle.can_transition_to(AwaitingConnection));
        assert!(AwaitingConnection.can_transition_to(AwaitingChainSwitch));
        assert!(AwaitingChainSwitch.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Confirming));
        assert!(Confirming.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Idle));
        assert!(Failed.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Submitted));
        assert!(!Failed.can_transition_to(Submitted));
        assert!(!Confirming.can_transition_to(AwaitingChainSwitch));
    }

    #[test]
    fn test_valid_transitions_matches_table() {
        use ClaimStatus::*;
        let all = [
            Idle,
            AwaitingConnection,
            AwaitingChainSwitch,
            Submitted,
            Confirming,
            Confirmed,
            Failed,
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    from.valid_transitions().contains(&to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_checking_session_is_not_idle() {
        let session = ClaimSession::begin(Uuid::new_v4(), ClaimStatus::Idle, 1, None);
        assert!(session.is_checking());
        assert!(!session.is_idle());
        assert!(ClaimSession::idle(1).is_idle());
        assert!(!ClaimSession::idle(1).is_checking());
    }

    #[test]
    fn test_visible_error_hides_rejections() {
        let mut session = ClaimSession::begin(Uuid::new_v4(), ClaimStatus::Submitted, 1, None);
        session.error = Some(ClaimFailure::UserRejected);
        assert!(session.visible_error().is_none());
        session.error = Some(ClaimFailure::ExecutionReverted(None));
        assert!(session.visible_error().is_some());
    }
}
