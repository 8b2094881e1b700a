//! JSON-RPC adapters for reward contracts
//!
//! `EvmWallet` plays the host wallet for headless use: "connecting" loads the
//! signer key from the environment and "switching chain" re-targets the
//! signer at another configured RPC endpoint after verifying its chain id.
//! `EvmContractClient` performs the contract calls through alloy providers.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::traits::{ContractCaller, WalletConnection, WalletState};
use crate::domain::{chain_name, ClaimReceipt, ContractFlavor, RewardContractRef};
use crate::error::{classify_rpc_error, ClaimFailure, ClaimerError, Result};
use crate::signing::Wallet;

// Generate contract bindings for the DailyClaim reward contracts
sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IDailyClaim {
        function claim() external;

        function lastClaimTime(address account) external view returns (uint256);

        /// Legacy contracts
        function dailyAmount() external view returns (uint256);

        /// Extended contracts
        function dailyClaimAmount() external view returns (uint256);
        function getContractBalance() external view returns (uint256);
        function isEligibleForClaim(address account) external view returns (bool);

        event Claimed(address user, uint256 amount);
    }
}

fn rpc_error(what: &str, contract: &RewardContractRef, e: impl std::fmt::Display) -> ClaimerError {
    ClaimerError::Rpc(format!("{} failed for {}: {}", what, contract.name, e))
}

fn classify_contract_error(err: &alloy::contract::Error) -> ClaimFailure {
    if let alloy::contract::Error::TransportError(rpc) = err {
        if let Some(payload) = rpc.as_error_resp() {
            return classify_rpc_error(Some(payload.code), &payload.message.to_string());
        }
    }
    classify_rpc_error(None, &err.to_string())
}

/// Headless wallet backed by a local private key
pub struct EvmWallet {
    key_env: String,
    default_chain_id: u64,
    rpc_urls: HashMap<u64, Url>,
    signer: RwLock<Option<Wallet>>,
    state_tx: watch::Sender<WalletState>,
}

impl EvmWallet {
    pub fn new(key_env: impl Into<String>, default_chain_id: u64, rpc_urls: HashMap<u64, Url>) -> Self {
        let (state_tx, _) = watch::channel(WalletState::disconnected());
        Self {
            key_env: key_env.into(),
            default_chain_id,
            rpc_urls,
            signer: RwLock::new(None),
            state_tx,
        }
    }

    fn rpc_url(&self, chain_id: u64) -> std::result::Result<Url, ClaimFailure> {
        self.rpc_urls.get(&chain_id).cloned().ok_or_else(|| {
            ClaimFailure::NetworkFailure(format!("no RPC endpoint configured for chain {}", chain_id))
        })
    }

    /// Ask the endpoint which chain it serves.
    async fn verify_chain(&self, chain_id: u64) -> std::result::Result<(), ClaimFailure> {
        let url = self.rpc_url(chain_id)?;
        let provider = ProviderBuilder::new().connect_http(url);
        let reported = provider
            .get_chain_id()
            .await
            .map_err(|e| ClaimFailure::NetworkFailure(format!("chain id check failed: {}", e)))?;
        if reported != chain_id {
            return Err(ClaimFailure::NetworkFailure(format!(
                "endpoint for chain {} reports chain {}",
                chain_id, reported
            )));
        }
        Ok(())
    }

    /// Signer for `account`, if it is the connected one
    pub async fn signer_for(&self, account: Address) -> Option<Wallet> {
        self.signer
            .read()
            .await
            .as_ref()
            .filter(|w| w.address() == account)
            .cloned()
    }

    pub async fn disconnect(&self) {
        *self.signer.write().await = None;
        self.state_tx.send_replace(WalletState::disconnected());
        info!("Wallet disconnected");
    }
}

#[async_trait]
impl WalletConnection for EvmWallet {
    fn state(&self) -> WalletState {
        *self.state_tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state_tx.subscribe()
    }

    async fn request_connect(&self) -> std::result::Result<(), ClaimFailure> {
        if self.state().connected {
            return Ok(());
        }

        let wallet = Wallet::from_env(&self.key_env)
            .map_err(|e| ClaimFailure::NetworkFailure(e.to_string()))?;
        self.verify_chain(self.default_chain_id).await?;

        let address = wallet.address();
        *self.signer.write().await = Some(wallet);
        self.state_tx
            .send_replace(WalletState::connected(address, self.default_chain_id));

        info!(
            "Wallet {} connected on {}",
            address,
            chain_name(self.default_chain_id)
        );
        Ok(())
    }

    async fn request_switch_chain(&self, chain_id: u64) -> std::result::Result<(), ClaimFailure> {
        let current = self.state();
        let Some(account) = current.active_account() else {
            return Err(ClaimFailure::NetworkFailure(
                "cannot switch chain while disconnected".into(),
            ));
        };
        if current.chain_id == Some(chain_id) {
            return Ok(());
        }

        self.verify_chain(chain_id).await?;
        self.state_tx
            .send_replace(WalletState::connected(account, chain_id));

        info!("Wallet {} switched to {}", account, chain_name(chain_id));
        Ok(())
    }
}

/// Reward contract client over HTTP JSON-RPC
pub struct EvmContractClient {
    rpc_urls: HashMap<u64, Url>,
    wallet: std::sync::Arc<EvmWallet>,
    receipt_poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl EvmContractClient {
    pub fn new(
        rpc_urls: HashMap<u64, Url>,
        wallet: std::sync::Arc<EvmWallet>,
        receipt_poll_interval: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            rpc_urls,
            wallet,
            receipt_poll_interval,
            confirmation_timeout,
        }
    }

    fn rpc_url(&self, contract: &RewardContractRef) -> Result<Url> {
        self.rpc_urls.get(&contract.chain_id).cloned().ok_or_else(|| {
            ClaimerError::Rpc(format!(
                "no RPC endpoint configured for chain {}",
                contract.chain_id
            ))
        })
    }
}

#[async_trait]
impl ContractCaller for EvmContractClient {
    async fn last_claim_time(&self, contract: &RewardContractRef, account: Address) -> Result<u64> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url(contract)?);
        let instance = IDailyClaim::new(contract.address, provider);

        let raw = instance
            .lastClaimTime(account)
            .call()
            .await
            .map_err(|e| rpc_error("lastClaimTime", contract, e))?;

        u64::try_from(raw).map_err(|_| {
            ClaimerError::Rpc(format!(
                "lastClaimTime for {} out of range: {}",
                contract.name, raw
            ))
        })
    }

    async fn per_claim_amount(&self, contract: &RewardContractRef) -> Result<U256> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url(contract)?);
        let instance = IDailyClaim::new(contract.address, provider);

        let amount = match contract.flavor {
            ContractFlavor::Legacy => instance.dailyAmount().call().await,
            ContractFlavor::Extended => instance.dailyClaimAmount().call().await,
        };
        amount.map_err(|e| rpc_error("per-claim amount", contract, e))
    }

    async fn pool_balance(&self, contract: &RewardContractRef) -> Result<Option<U256>> {
        if !contract.flavor.supports_pool_balance() {
            return Ok(None);
        }
        let provider = ProviderBuilder::new().connect_http(self.rpc_url(contract)?);
        let instance = IDailyClaim::new(contract.address, provider);

        instance
            .getContractBalance()
            .call()
            .await
            .map(Some)
            .map_err(|e| rpc_error("getContractBalance", contract, e))
    }

    async fn contract_eligibility(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> Result<Option<bool>> {
        if !contract.flavor.supports_eligibility_read() {
            return Ok(None);
        }
        let provider = ProviderBuilder::new().connect_http(self.rpc_url(contract)?);
        let instance = IDailyClaim::new(contract.address, provider);

        instance
            .isEligibleForClaim(account)
            .call()
            .await
            .map(Some)
            .map_err(|e| rpc_error("isEligibleForClaim", contract, e))
    }

    async fn send_claim(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> std::result::Result<TxHash, ClaimFailure> {
        let signer = self.wallet.signer_for(account).await.ok_or_else(|| {
            ClaimFailure::NetworkFailure(format!("no connected signer for {}", account))
        })?;
        let url = self
            .rpc_url(contract)
            .map_err(|e| ClaimFailure::NetworkFailure(e.to_string()))?;

        let provider = ProviderBuilder::new()
            .wallet(signer.ethereum_wallet())
            .connect_http(url);
        let instance = IDailyClaim::new(contract.address, provider);

        info!("Calling {}.claim() from {}...", contract, account);

        let pending = instance.claim().send().await.map_err(|e| {
            let failure = classify_contract_error(&e);
            warn!("claim() send failed for {}: {}", contract.name, e);
            failure
        })?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(
        &self,
        contract: &RewardContractRef,
        tx_hash: TxHash,
    ) -> std::result::Result<ClaimReceipt, ClaimFailure> {
        let url = self
            .rpc_url(contract)
            .map_err(|e| ClaimFailure::NetworkFailure(e.to_string()))?;
        let provider = ProviderBuilder::new().connect_http(url);

        let poll = async {
            loop {
                match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => break receipt,
                    Ok(None) => debug!("Receipt for {} not available yet", tx_hash),
                    Err(e) => warn!("Receipt lookup for {} failed: {}", tx_hash, e),
                }
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        };

        let receipt = tokio::time::timeout(self.confirmation_timeout, poll)
            .await
            .map_err(|_| {
                ClaimFailure::NetworkFailure(format!(
                    "no receipt for {} after {}s",
                    tx_hash,
                    self.confirmation_timeout.as_secs()
                ))
            })?;

        if !receipt.status() {
            return Err(ClaimFailure::ExecutionReverted(None));
        }

        let claimed_amount = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.address() == contract.address)
            .find_map(|log| IDailyClaim::Claimed::decode_log(&log.inner).ok())
            .map(|decoded| decoded.data.amount);

        Ok(ClaimReceipt {
            tx_hash,
            block_number: receipt.block_number,
            claimed_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimed_event_signature() {
        assert_eq!(
            IDailyClaim::Claimed::SIGNATURE,
            "Claimed(address,uint256)"
        );
    }

    #[tokio::test]
    async fn test_switch_requires_connection() {
        let wallet = EvmWallet::new("REWARD_CLAIMER_TEST_UNSET_KEY", 42161, HashMap::new());
        let err = wallet.request_switch_chain(8453).await.unwrap_err();
        assert!(matches!(err, ClaimFailure::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn test_connect_without_key_fails_cleanly() {
        let wallet = EvmWallet::new("REWARD_CLAIMER_TEST_UNSET_KEY", 42161, HashMap::new());
        let err = wallet.request_connect().await.unwrap_err();
        assert!(matches!(err, ClaimFailure::NetworkFailure(_)));
        assert!(!wallet.state().connected);
    }

    #[tokio::test]
    async fn test_send_without_signer_is_network_failure() {
        let wallet = std::sync::Arc::new(EvmWallet::new(
            "REWARD_CLAIMER_TEST_UNSET_KEY",
            42161,
            HashMap::new(),
        ));
        let client = EvmContractClient::new(
            HashMap::new(),
            wallet,
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        let contract = RewardContractRef {
            name: "test".into(),
            address: Address::ZERO,
            chain_id: 42161,
            per_claim_amount: U256::ZERO,
            decimals: 18,
            symbol: "ARB".into(),
            cooldown_secs: 86_400,
            flavor: ContractFlavor::Legacy,
        };
        let err = client
            .send_claim(&contract, Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimFailure::NetworkFailure(_)));
    }
}
