//! Chain reward reader
//!
//! Reads the per-account claim timestamp and the pool parameters from one
//! reward contract and keeps the last good answer. A failed refresh keeps
//! serving the previous snapshot; a refresh that finishes after the account
//! changed is dropped.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::adapters::ContractCaller;
use crate::domain::{ClaimWindow, RewardContractRef};
use crate::error::Result;

/// Everything read from the contract for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardSnapshot {
    pub account: Address,
    /// Seconds since epoch, 0 if the account never claimed
    pub last_claim_timestamp: u64,
    pub per_claim_amount: U256,
    /// Tokens left in the pool (extended contracts only)
    pub pool_balance: Option<U256>,
    /// Contract-side eligibility flag (extended contracts only)
    pub contract_says_eligible: Option<bool>,
    pub fetched_at: DateTime<Utc>,
}

impl RewardSnapshot {
    pub fn window(&self, cooldown_secs: u64) -> ClaimWindow {
        ClaimWindow::new(self.last_claim_timestamp, cooldown_secs)
    }

    /// Whether the pool still holds one payout, when the contract reports it
    pub fn pool_can_cover(&self) -> Option<bool> {
        self.pool_balance
            .map(|balance| balance >= self.per_claim_amount)
    }
}

#[derive(Debug, Default)]
struct ReaderCache {
    account: Option<Address>,
    snapshot: Option<RewardSnapshot>,
    last_error: Option<String>,
}

/// Cached view of one reward contract
pub struct ChainRewardReader {
    contract: RewardContractRef,
    caller: Arc<dyn ContractCaller>,
    cache: RwLock<ReaderCache>,
}

impl ChainRewardReader {
    pub fn new(contract: RewardContractRef, caller: Arc<dyn ContractCaller>) -> Self {
        Self {
            contract,
            caller,
            cache: RwLock::new(ReaderCache::default()),
        }
    }

    pub fn contract(&self) -> &RewardContractRef {
        &self.contract
    }

    /// Point the cache at `account`, dropping data that belongs to another one.
    pub async fn select_account(&self, account: Option<Address>) {
        let mut cache = self.cache.write().await;
        if cache.account != account {
            debug!(
                "Reader for {} switching account {:?} -> {:?}",
                self.contract.name, cache.account, account
            );
            cache.account = account;
            cache.snapshot = None;
            cache.last_error = None;
        }
    }

    /// Re-read the contract for `account`.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned to the caller.
    #[instrument(skip(self), fields(pool = %self.contract.name))]
    pub async fn refresh(&self, account: Address) -> Result<RewardSnapshot> {
        self.select_account(Some(account)).await;

        let fetched = self.fetch(account).await;

        let mut cache = self.cache.write().await;
        if cache.account != Some(account) {
            debug!("Account changed during refresh, discarding result for {}", account);
            return fetched;
        }

        match fetched {
            Ok(snapshot) => {
                cache.snapshot = Some(snapshot.clone());
                cache.last_error = None;
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    "Refresh failed for {} on {}: {} (keeping previous value)",
                    account, self.contract.name, e
                );
                cache.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self, account: Address) -> Result<RewardSnapshot> {
        let last_claim_timestamp = self.caller.last_claim_time(&self.contract, account).await?;

        let per_claim_amount = match self.caller.per_claim_amount(&self.contract).await {
            Ok(amount) if !amount.is_zero() => amount,
            Ok(_) => self.contract.per_claim_amount,
            Err(e) => {
                debug!("Per-claim amount unavailable ({}), using configured value", e);
                self.contract.per_claim_amount
            }
        };

        let pool_balance = self
            .caller
            .pool_balance(&self.contract)
            .await
            .unwrap_or_else(|e| {
                debug!("Pool balance unavailable: {}", e);
                None
            });

        let contract_says_eligible = self
            .caller
            .contract_eligibility(&self.contract, account)
            .await
            .unwrap_or_else(|e| {
                debug!("Contract eligibility unavailable: {}", e);
                None
            });

        let snapshot = RewardSnapshot {
            account,
            last_claim_timestamp,
            per_claim_amount,
            pool_balance,
            contract_says_eligible,
            fetched_at: Utc::now(),
        };

        if snapshot.pool_can_cover() == Some(false) {
            warn!(
                "Pool {} holds {} which is less than one claim ({})",
                self.contract.name,
                self.contract
                    .display_amount(snapshot.pool_balance.unwrap_or_default()),
                self.contract.display_amount(per_claim_amount)
            );
        }

        Ok(snapshot)
    }

    /// Last good snapshot for `account`
    pub async fn snapshot(&self, account: Address) -> Option<RewardSnapshot> {
        let cache = self.cache.read().await;
        if cache.account == Some(account) {
            cache.snapshot.clone()
        } else {
            None
        }
    }

    pub async fn window_for(&self, account: Address) -> Option<ClaimWindow> {
        self.snapshot(account)
            .await
            .map(|s| s.window(self.contract.cooldown_secs))
    }

    pub async fn last_error(&self) -> Option<String> {
        self.cache.read().await.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::MockContractCaller;
    use crate::domain::{ContractFlavor, ARBITRUM_CHAIN_ID};
    use crate::error::ClaimerError;

    fn pool() -> RewardContractRef {
        RewardContractRef {
            name: "arbitrum".into(),
            address: Address::repeat_byte(0xE4),
            chain_id: ARBITRUM_CHAIN_ID,
            per_claim_amount: U256::from(25u64),
            decimals: 18,
            symbol: "ARB".into(),
            cooldown_secs: 86_400,
            flavor: ContractFlavor::Legacy,
        }
    }

    fn legacy_mock(last_claim: u64) -> MockContractCaller {
        let mut mock = MockContractCaller::new();
        mock.expect_last_claim_time()
            .returning(move |_, _| Ok(last_claim));
        mock.expect_per_claim_amount()
            .returning(|_| Ok(U256::from(25u64)));
        mock.expect_pool_balance().returning(|_| Ok(None));
        mock.expect_contract_eligibility().returning(|_, _| Ok(None));
        mock
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let account = Address::repeat_byte(0x01);
        let reader = ChainRewardReader::new(pool(), Arc::new(legacy_mock(1_700_000_000)));

        assert!(reader.snapshot(account).await.is_none());
        let snapshot = reader.refresh(account).await.unwrap();

        assert_eq!(snapshot.last_claim_timestamp, 1_700_000_000);
        assert_eq!(
            reader.window_for(account).await,
            Some(ClaimWindow::new(1_700_000_000, 86_400))
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let account = Address::repeat_byte(0x01);
        let mut mock = MockContractCaller::new();
        let mut calls = 0;
        mock.expect_last_claim_time().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(42)
            } else {
                Err(ClaimerError::Rpc("timeout".into()))
            }
        });
        mock.expect_per_claim_amount()
            .returning(|_| Ok(U256::from(25u64)));
        mock.expect_pool_balance().returning(|_| Ok(None));
        mock.expect_contract_eligibility().returning(|_, _| Ok(None));

        let reader = ChainRewardReader::new(pool(), Arc::new(mock));
        reader.refresh(account).await.unwrap();
        assert!(reader.refresh(account).await.is_err());

        let snapshot = reader.snapshot(account).await.unwrap();
        assert_eq!(snapshot.last_claim_timestamp, 42);
        assert!(reader.last_error().await.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_account_switch_drops_old_snapshot() {
        let first = Address::repeat_byte(0x01);
        let second = Address::repeat_byte(0x02);
        let reader = ChainRewardReader::new(pool(), Arc::new(legacy_mock(10)));

        reader.refresh(first).await.unwrap();
        reader.select_account(Some(second)).await;

        assert!(reader.snapshot(first).await.is_none());
        assert!(reader.snapshot(second).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_amount_read_uses_configured_amount() {
        let account = Address::repeat_byte(0x01);
        let mut mock = MockContractCaller::new();
        mock.expect_last_claim_time().returning(|_, _| Ok(0));
        mock.expect_per_claim_amount()
            .returning(|_| Err(ClaimerError::Rpc("no getter".into())));
        mock.expect_pool_balance().returning(|_| Ok(None));
        mock.expect_contract_eligibility().returning(|_, _| Ok(None));

        let reader = ChainRewardReader::new(pool(), Arc::new(mock));
        let snapshot = reader.refresh(account).await.unwrap();
        assert_eq!(snapshot.per_claim_amount, U256::from(25u64));
    }

    #[tokio::test]
    async fn test_pool_can_cover() {
        let account = Address::repeat_byte(0x01);
        let mut mock = MockContractCaller::new();
        mock.expect_last_claim_time().returning(|_, _| Ok(0));
        mock.expect_per_claim_amount()
            .returning(|_| Ok(U256::from(25u64)));
        mock.expect_pool_balance()
            .returning(|_| Ok(Some(U256::from(10u64))));
        mock.expect_contract_eligibility()
            .returning(|_, _| Ok(Some(true)));

        let reader = ChainRewardReader::new(pool(), Arc::new(mock));
        let snapshot = reader.refresh(account).await.unwrap();
        assert_eq!(snapshot.pool_can_cover(), Some(false));
        assert_eq!(snapshot.contract_says_eligible, Some(true));
    }
}
