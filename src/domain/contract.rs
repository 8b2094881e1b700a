use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ARBITRUM_CHAIN_ID: u64 = 42161;
pub const CELO_CHAIN_ID: u64 = 42220;
pub const BASE_CHAIN_ID: u64 = 8453;

/// Reward contracts enforce `block.timestamp >= lastClaimTime + 1 days`
pub const DEFAULT_COOLDOWN_SECS: u64 = 86_400;

/// Decimal places shown for reward amounts
const DISPLAY_DP: u32 = 4;

pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        ARBITRUM_CHAIN_ID => "arbitrum",
        CELO_CHAIN_ID => "celo",
        BASE_CHAIN_ID => "base",
        _ => "unknown",
    }
}

/// Which read surface the deployed reward contract exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractFlavor {
    /// `lastClaimTime(address)` + `dailyAmount()`
    #[default]
    Legacy,
    /// `lastClaimTime(address)` + `dailyClaimAmount()` + `getContractBalance()`
    /// + `isEligibleForClaim(address)`
    Extended,
}

impl ContractFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractFlavor::Legacy => "legacy",
            ContractFlavor::Extended => "extended",
        }
    }

    pub fn supports_pool_balance(&self) -> bool {
        matches!(self, ContractFlavor::Extended)
    }

    pub fn supports_eligibility_read(&self) -> bool {
        matches!(self, ContractFlavor::Extended)
    }
}

impl fmt::Display for ContractFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContractFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ContractFlavor::Legacy),
            "extended" => Ok(ContractFlavor::Extended),
            _ => Err(format!("Unknown contract flavor: {}", s)),
        }
    }
}

/// Immutable description of one reward pool, fixed at configuration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardContractRef {
    /// Pool name used on the CLI and in logs (e.g. "arbitrum-arb")
    pub name: String,
    pub address: Address,
    pub chain_id: u64,
    /// Configured per-claim amount in the token's smallest unit
    pub per_claim_amount: U256,
    pub decimals: u8,
    pub symbol: String,
    pub cooldown_secs: u64,
    pub flavor: ContractFlavor,
}

impl RewardContractRef {
    pub fn chain_name(&self) -> &'static str {
        chain_name(self.chain_id)
    }

    /// Render an amount of this pool's token, e.g. "0.0250 ARB"
    pub fn display_amount(&self, amount: U256) -> String {
        format!("{} {}", format_token_amount(amount, self.decimals), self.symbol)
    }
}

impl fmt::Display for RewardContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.chain_name(), self.address)
    }
}

/// Format a raw token amount with four decimal places.
///
/// Amounts too large for `Decimal` fall back to the full-precision string.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let Ok(units) = format_units(amount, decimals) else {
        return amount.to_string();
    };
    match Decimal::from_str(&units) {
        Ok(value) => format!("{:.4}", value.round_dp(DISPLAY_DP)),
        Err(_) => units,
    }
}
