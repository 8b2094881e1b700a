use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the reward claimer
#[derive(Error, Debug)]
pub enum ClaimerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Chain access errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    #[error("Unknown reward pool: {0}")]
    PoolNotFound(String),

    // Claim flow errors
    #[error("Claim failed: {0}")]
    Claim(#[from] ClaimFailure),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    // Serialization errors
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Result type alias for ClaimerError
pub type Result<T> = std::result::Result<T, ClaimerError>;

/// Why a claim attempt did not reach `Confirmed`.
///
/// `UserRejected` is an expected cancellation path and should not alarm the
/// user; every other variant is something that went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ClaimFailure {
    #[error("request rejected by user")]
    UserRejected,

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("execution reverted{}", reason_suffix(.0))]
    ExecutionReverted(Option<String>),

    #[error("reward data unavailable: {0}")]
    ReadUnavailable(String),

    #[error("cooldown active, {seconds_remaining}s remaining")]
    CooldownActive { seconds_remaining: u64 },
}

impl ClaimFailure {
    /// Rejections reset the session without surfacing an error.
    pub fn is_silent(&self) -> bool {
        matches!(self, ClaimFailure::UserRejected)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClaimFailure::UserRejected => "user_rejected",
            ClaimFailure::NetworkFailure(_) => "network_failure",
            ClaimFailure::ExecutionReverted(_) => "execution_reverted",
            ClaimFailure::ReadUnavailable(_) => "read_unavailable",
            ClaimFailure::CooldownActive { .. } => "cooldown_active",
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;
/// Geth/EIP-1474 code for reverted `eth_call` / `eth_estimateGas`
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Map a JSON-RPC error (code + message) onto the claim failure taxonomy.
pub fn classify_rpc_error(code: Option<i64>, message: &str) -> ClaimFailure {
    let lower = message.to_ascii_lowercase();

    if code == Some(USER_REJECTED_CODE)
        || lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected the request")
    {
        return ClaimFailure::UserRejected;
    }

    if code == Some(EXECUTION_REVERTED_CODE) || lower.contains("execution reverted") {
        return ClaimFailure::ExecutionReverted(revert_reason(message));
    }

    ClaimFailure::NetworkFailure(message.to_string())
}

/// Pull the human-readable reason out of "execution reverted: <reason>".
fn revert_reason(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let idx = lower.find("execution reverted")?;
    let rest = message[idx + "execution reverted".len()..]
        .trim_start_matches(':')
        .trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_user_rejection_by_code_and_text() {
        assert_eq!(
            classify_rpc_error(Some(4001), "anything"),
            ClaimFailure::UserRejected
        );
        assert_eq!(
            classify_rpc_error(None, "MetaMask Tx Signature: User denied transaction signature."),
            ClaimFailure::UserRejected
        );
    }

    #[test]
    fn test_classify_revert_extracts_reason() {
        assert_eq!(
            classify_rpc_error(Some(3), "execution reverted: Already claimed today"),
            ClaimFailure::ExecutionReverted(Some("Already claimed today".to_string()))
        );
        assert_eq!(
            classify_rpc_error(None, "execution reverted"),
            ClaimFailure::ExecutionReverted(None)
        );
    }

    #[test]
    fn test_classify_falls_back_to_network_failure() {
        let failure = classify_rpc_error(Some(-32000), "connection reset by peer");
        assert!(matches!(failure, ClaimFailure::NetworkFailure(_)));
        assert!(!failure.is_silent());
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(
            ClaimFailure::ExecutionReverted(Some("pool empty".into())).to_string(),
            "execution reverted: pool empty"
        );
        assert_eq!(
            ClaimFailure::ExecutionReverted(None).to_string(),
            "execution reverted"
        );
        assert!(ClaimFailure::UserRejected.is_silent());
    }
}
