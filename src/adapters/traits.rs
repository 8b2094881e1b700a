//! Capabilities the orchestrator consumes from the host
//!
//! The wallet adapter owns account/chain state and publishes it through a
//! watch channel; the contract caller performs reads, writes and receipt
//! lookups against one reward contract.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{ClaimReceipt, Readiness, RewardContractRef};
use crate::error::{ClaimFailure, Result};

/// Snapshot of the host wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletState {
    pub connected: bool,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
}

impl WalletState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connected(account: Address, chain_id: u64) -> Self {
        Self {
            connected: true,
            account: Some(account),
            chain_id: Some(chain_id),
        }
    }

    /// Account, only while connected
    pub fn active_account(&self) -> Option<Address> {
        if self.connected {
            self.account
        } else {
            None
        }
    }

    pub fn readiness(&self, target_chain: u64) -> Readiness {
        match self.active_account() {
            None => Readiness::Disconnected,
            Some(_) if self.chain_id != Some(target_chain) => Readiness::WrongChain,
            Some(_) => Readiness::Ready,
        }
    }

    /// Connected as `account` on `chain_id`
    pub fn matches(&self, account: Address, chain_id: u64) -> bool {
        self.active_account() == Some(account) && self.chain_id == Some(chain_id)
    }
}

/// Host wallet-adapter capability
#[async_trait]
pub trait WalletConnection: Send + Sync {
    fn state(&self) -> WalletState;

    fn subscribe(&self) -> watch::Receiver<WalletState>;

    /// Ask the host to connect. Returns once the request was handled; the
    /// new state arrives through `subscribe()`.
    async fn request_connect(&self) -> std::result::Result<(), ClaimFailure>;

    async fn request_switch_chain(&self, chain_id: u64) -> std::result::Result<(), ClaimFailure>;
}

/// Contract read/write capability for reward pools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractCaller: Send + Sync {
    async fn last_claim_time(&self, contract: &RewardContractRef, account: Address)
        -> Result<u64>;

    async fn per_claim_amount(&self, contract: &RewardContractRef) -> Result<U256>;

    /// `None` when the contract flavor has no balance getter
    async fn pool_balance(&self, contract: &RewardContractRef) -> Result<Option<U256>>;

    /// Contract-side eligibility flag, `None` when unsupported
    async fn contract_eligibility(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> Result<Option<bool>>;

    /// Send `claim()` from `account`; resolves once the wallet accepted it.
    async fn send_claim(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> std::result::Result<TxHash, ClaimFailure>;

    /// Resolve once the transaction is in a block.
    async fn wait_for_confirmation(
        &self,
        contract: &RewardContractRef,
        tx_hash: TxHash,
    ) -> std::result::Result<ClaimReceipt, ClaimFailure>;
}
