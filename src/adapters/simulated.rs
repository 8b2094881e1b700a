//! In-memory chain and wallet for dry runs
//!
//! `SimulatedChain` enforces the same cooldown rule as the deployed
//! DailyClaim contracts and lets callers script rejections, reverts and
//! network failures. `SimulatedWallet` is a host wallet whose connect and
//! switch requests can be delayed, refused or failed on demand.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::traits::{ContractCaller, WalletConnection, WalletState};
use crate::clock::ClockSource;
use crate::domain::{ClaimReceipt, RewardContractRef};
use crate::error::{ClaimFailure, ClaimerError, Result};

/// Scripted outcome for the next `send_claim`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedSend {
    RejectByUser,
    RevertOnSend(Option<String>),
    RevertOnConfirm(Option<String>),
    NetworkFailure(String),
}

#[derive(Debug, Clone)]
struct PendingClaim {
    contract: Address,
    account: Address,
    amount: U256,
    revert: Option<Option<String>>,
}

#[derive(Debug, Default)]
struct ChainState {
    last_claims: HashMap<(Address, Address), u64>,
    balances: HashMap<Address, U256>,
    pending: HashMap<TxHash, PendingClaim>,
    script: VecDeque<ScriptedSend>,
    block_number: u64,
}

/// Reward contracts living in memory
pub struct SimulatedChain {
    clock: Arc<dyn ClockSource>,
    confirmation_delay: Duration,
    state: Mutex<ChainState>,
    fail_reads: AtomicBool,
    sends: AtomicUsize,
    tx_counter: AtomicU64,
}

impl SimulatedChain {
    pub fn new(clock: Arc<dyn ClockSource>, confirmation_delay: Duration) -> Self {
        Self {
            clock,
            confirmation_delay,
            state: Mutex::new(ChainState::default()),
            fail_reads: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
            tx_counter: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_last_claim(&self, contract: Address, account: Address, timestamp: u64) {
        self.lock().last_claims.insert((contract, account), timestamp);
    }

    pub fn last_claim(&self, contract: Address, account: Address) -> u64 {
        self.lock()
            .last_claims
            .get(&(contract, account))
            .copied()
            .unwrap_or(0)
    }

    /// Give an extended-flavor pool a token balance to pay out from
    pub fn fund(&self, contract: Address, amount: U256) {
        self.lock().balances.insert(contract, amount);
    }

    pub fn script(&self, outcome: ScriptedSend) {
        self.lock().script.push_back(outcome);
    }

    pub fn set_read_failure(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of `send_claim` calls that reached the chain
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn check_reads(&self, contract: &RewardContractRef) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClaimerError::Rpc(format!(
                "simulated read failure for {}",
                contract.name
            )));
        }
        Ok(())
    }

    fn next_tx_hash(&self) -> TxHash {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        TxHash::left_padding_from(&n.to_be_bytes())
    }

    /// Reproduces the contract's `require` checks.
    fn revert_reason(&self, state: &ChainState, contract: &RewardContractRef, account: Address) -> Option<String> {
        let last = state
            .last_claims
            .get(&(contract.address, account))
            .copied()
            .unwrap_or(0);
        if last != 0 && self.clock.now() < last.saturating_add(contract.cooldown_secs) {
            return Some("Already claimed today".to_string());
        }
        if contract.flavor.supports_pool_balance() {
            let balance = state
                .balances
                .get(&contract.address)
                .copied()
                .unwrap_or(U256::ZERO);
            if balance < contract.per_claim_amount {
                return Some("Insufficient contract balance".to_string());
            }
        }
        None
    }
}

#[async_trait]
impl ContractCaller for SimulatedChain {
    async fn last_claim_time(&self, contract: &RewardContractRef, account: Address) -> Result<u64> {
        self.check_reads(contract)?;
        Ok(self.last_claim(contract.address, account))
    }

    async fn per_claim_amount(&self, contract: &RewardContractRef) -> Result<U256> {
        self.check_reads(contract)?;
        Ok(contract.per_claim_amount)
    }

    async fn pool_balance(&self, contract: &RewardContractRef) -> Result<Option<U256>> {
        self.check_reads(contract)?;
        if !contract.flavor.supports_pool_balance() {
            return Ok(None);
        }
        Ok(Some(
            self.lock()
                .balances
                .get(&contract.address)
                .copied()
                .unwrap_or(U256::ZERO),
        ))
    }

    async fn contract_eligibility(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> Result<Option<bool>> {
        self.check_reads(contract)?;
        if !contract.flavor.supports_eligibility_read() {
            return Ok(None);
        }
        let last = self.last_claim(contract.address, account);
        Ok(Some(
            last == 0 || self.clock.now() >= last.saturating_add(contract.cooldown_secs),
        ))
    }

    async fn send_claim(
        &self,
        contract: &RewardContractRef,
        account: Address,
    ) -> std::result::Result<TxHash, ClaimFailure> {
        self.sends.fetch_add(1, Ordering::SeqCst);

        let mut state = self.lock();
        let scripted = state.script.pop_front();
        let mut revert = self.revert_reason(&state, contract, account).map(Some);

        match scripted {
            Some(ScriptedSend::RejectByUser) => return Err(ClaimFailure::UserRejected),
            Some(ScriptedSend::RevertOnSend(reason)) => {
                return Err(ClaimFailure::ExecutionReverted(reason))
            }
            Some(ScriptedSend::NetworkFailure(msg)) => {
                return Err(ClaimFailure::NetworkFailure(msg))
            }
            Some(ScriptedSend::RevertOnConfirm(reason)) => revert = Some(reason),
            None => {}
        }

        let tx_hash = self.next_tx_hash();
        state.pending.insert(
            tx_hash,
            PendingClaim {
                contract: contract.address,
                account,
                amount: contract.per_claim_amount,
                revert,
            },
        );
        debug!("Simulated claim {} from {} on {}", tx_hash, account, contract.name);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(
        &self,
        contract: &RewardContractRef,
        tx_hash: TxHash,
    ) -> std::result::Result<ClaimReceipt, ClaimFailure> {
        tokio::time::sleep(self.confirmation_delay).await;

        let mut state = self.lock();
        let pending = state.pending.remove(&tx_hash).ok_or_else(|| {
            ClaimFailure::NetworkFailure(format!("unknown transaction {}", tx_hash))
        })?;

        state.block_number += 1;
        if let Some(reason) = pending.revert {
            return Err(ClaimFailure::ExecutionReverted(reason));
        }

        let now = self.clock.now();
        state
            .last_claims
            .insert((pending.contract, pending.account), now);
        if contract.flavor.supports_pool_balance() {
            let balance = state.balances.entry(pending.contract).or_default();
            *balance = balance.saturating_sub(pending.amount);
        }

        info!(
            "Simulated claim confirmed in block {} ({})",
            state.block_number,
            contract.display_amount(pending.amount)
        );
        Ok(ClaimReceipt {
            tx_hash,
            block_number: Some(state.block_number),
            claimed_amount: Some(pending.amount),
        })
    }
}

/// Host wallet whose behaviour is driven by the caller
pub struct SimulatedWallet {
    state_tx: watch::Sender<WalletState>,
    account: Address,
    initial_chain: u64,
    /// When false, requests are accepted but the state never flips
    responsive: AtomicBool,
    connect_failure: Mutex<Option<ClaimFailure>>,
    switch_failure: Mutex<Option<ClaimFailure>>,
    connect_requests: AtomicUsize,
    switch_requests: AtomicUsize,
}

impl SimulatedWallet {
    /// A disconnected wallet that connects as `account` on `initial_chain`
    pub fn new(account: Address, initial_chain: u64) -> Self {
        let (state_tx, _) = watch::channel(WalletState::disconnected());
        Self {
            state_tx,
            account,
            initial_chain,
            responsive: AtomicBool::new(true),
            connect_failure: Mutex::new(None),
            switch_failure: Mutex::new(None),
            connect_requests: AtomicUsize::new(0),
            switch_requests: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: WalletState) {
        self.state_tx.send_replace(state);
    }

    pub fn connect_as(&self, account: Address, chain_id: u64) {
        self.set_state(WalletState::connected(account, chain_id));
    }

    pub fn disconnect(&self) {
        self.set_state(WalletState::disconnected());
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    pub fn fail_next_connect(&self, failure: ClaimFailure) {
        *self
            .connect_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(failure);
    }

    pub fn fail_next_switch(&self, failure: ClaimFailure) {
        *self
            .switch_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(failure);
    }

    pub fn connect_requests(&self) -> usize {
        self.connect_requests.load(Ordering::SeqCst)
    }

    pub fn switch_requests(&self) -> usize {
        self.switch_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletConnection for SimulatedWallet {
    fn state(&self) -> WalletState {
        *self.state_tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state_tx.subscribe()
    }

    async fn request_connect(&self) -> std::result::Result<(), ClaimFailure> {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .connect_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(failure) = failure {
            return Err(failure);
        }
        if self.responsive.load(Ordering::SeqCst) && !self.state().connected {
            self.connect_as(self.account, self.initial_chain);
        }
        Ok(())
    }

    async fn request_switch_chain(&self, chain_id: u64) -> std::result::Result<(), ClaimFailure> {
        self.switch_requests.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .switch_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(failure) = failure {
            return Err(failure);
        }
        let current = self.state();
        let Some(account) = current.active_account() else {
            return Err(ClaimFailure::NetworkFailure(
                "cannot switch chain while disconnected".into(),
            ));
        };
        if self.responsive.load(Ordering::SeqCst) {
            self.connect_as(account, chain_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{ContractFlavor, ARBITRUM_CHAIN_ID};

    fn pool(flavor: ContractFlavor) -> RewardContractRef {
        RewardContractRef {
            name: "sim".into(),
            address: Address::repeat_byte(0xAA),
            chain_id: ARBITRUM_CHAIN_ID,
            per_claim_amount: U256::from(25u64),
            decimals: 18,
            symbol: "ARB".into(),
            cooldown_secs: 86_400,
            flavor,
        }
    }

    #[tokio::test]
    async fn test_confirm_records_claim_time() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let chain = SimulatedChain::new(clock.clone(), Duration::ZERO);
        let contract = pool(ContractFlavor::Legacy);
        let account = Address::repeat_byte(0x01);

        let tx = chain.send_claim(&contract, account).await.unwrap();
        let receipt = chain.wait_for_confirmation(&contract, tx).await.unwrap();

        assert_eq!(receipt.block_number, Some(1));
        assert_eq!(chain.last_claim(contract.address, account), 1_000_000);
        assert_eq!(chain.send_count(), 1);
    }

    #[tokio::test]
    async fn test_second_claim_in_window_reverts() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let chain = SimulatedChain::new(clock.clone(), Duration::ZERO);
        let contract = pool(ContractFlavor::Legacy);
        let account = Address::repeat_byte(0x01);
        chain.set_last_claim(contract.address, account, 999_000);

        let tx = chain.send_claim(&contract, account).await.unwrap();
        let err = chain.wait_for_confirmation(&contract, tx).await.unwrap_err();
        assert_eq!(
            err,
            ClaimFailure::ExecutionReverted(Some("Already claimed today".into()))
        );
    }

    #[tokio::test]
    async fn test_extended_pool_tracks_balance() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let chain = SimulatedChain::new(clock, Duration::ZERO);
        let contract = pool(ContractFlavor::Extended);
        let account = Address::repeat_byte(0x01);
        chain.fund(contract.address, U256::from(60u64));

        let tx = chain.send_claim(&contract, account).await.unwrap();
        chain.wait_for_confirmation(&contract, tx).await.unwrap();

        assert_eq!(
            chain.pool_balance(&contract).await.unwrap(),
            Some(U256::from(35u64))
        );
        assert_eq!(
            chain.contract_eligibility(&contract, account).await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_unresponsive_wallet_accepts_but_does_not_connect() {
        let wallet = SimulatedWallet::new(Address::repeat_byte(0x02), 1);
        wallet.set_responsive(false);
        wallet.request_connect().await.unwrap();
        assert!(!wallet.state().connected);
        assert_eq!(wallet.connect_requests(), 1);
    }
}
