//! One orchestrator per configured reward pool
//!
//! Pools share the wallet, the clock, the transactor's in-flight
//! registry and the automation lease; everything else is per pool.

use alloy::primitives::{address, Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::adapters::{
    ContractCaller, EvmContractClient, EvmWallet, SimulatedChain, SimulatedWallet, WalletConnection,
};
use crate::clock::{ClockSource, SystemClock};
use crate::config::AppConfig;
use crate::domain::RewardContractRef;
use crate::error::{ClaimerError, Result};
use crate::services::auto_trigger::{AutoTriggerConfig, AutoTriggerController, AutomationLease};
use crate::services::orchestrator::{ClaimOrchestrator, OrchestratorConfig};
use crate::services::reward_reader::ChainRewardReader;
use crate::services::transactor::ClaimTransactor;

/// Account the simulated wallet connects as
pub const SIMULATED_ACCOUNT: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// How long a simulated claim takes to confirm
const SIMULATED_CONFIRMATION: Duration = Duration::from_secs(2);

/// Orchestrator and auto-trigger for one pool
#[derive(Clone)]
pub struct PoolHandle {
    pub orchestrator: ClaimOrchestrator,
    pub auto_trigger: Arc<AutoTriggerController>,
}

impl PoolHandle {
    pub fn contract(&self) -> &RewardContractRef {
        self.orchestrator.contract()
    }
}

pub struct PoolSet {
    pools: Vec<PoolHandle>,
    wallet: Arc<dyn WalletConnection>,
}

impl PoolSet {
    /// Wire pools over an existing wallet and contract caller.
    pub fn build(
        contracts: Vec<RewardContractRef>,
        wallet: Arc<dyn WalletConnection>,
        caller: Arc<dyn ContractCaller>,
        clock: Arc<dyn ClockSource>,
        orchestrator_config: OrchestratorConfig,
        auto_config: AutoTriggerConfig,
    ) -> Self {
        let transactor = ClaimTransactor::new(caller.clone());
        let lease = AutomationLease::new(auto_config.lease_timeout);
        let pools = contracts
            .into_iter()
            .map(|contract| {
                let reader = Arc::new(ChainRewardReader::new(contract.clone(), caller.clone()));
                let orchestrator = ClaimOrchestrator::new(
                    contract,
                    wallet.clone(),
                    reader,
                    transactor.clone(),
                    clock.clone(),
                    orchestrator_config.clone(),
                );
                let auto_trigger = Arc::new(AutoTriggerController::with_lease(
                    orchestrator.clone(),
                    auto_config.clone(),
                    lease.clone(),
                ));
                PoolHandle {
                    orchestrator,
                    auto_trigger,
                }
            })
            .collect();

        Self { pools, wallet }
    }

    /// Pools backed by JSON-RPC and a local signer
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let contracts = config.to_contract_refs()?;
        let rpc_urls = config.rpc_urls()?;
        let chain_id = config
            .wallet_chain_id()
            .ok_or_else(|| ClaimerError::Validation("no pools configured".into()))?;

        let wallet = Arc::new(EvmWallet::new(
            config.wallet.private_key_env.clone(),
            chain_id,
            rpc_urls.clone(),
        ));
        let caller = Arc::new(EvmContractClient::new(
            rpc_urls,
            wallet.clone(),
            config.orchestrator.receipt_poll_interval(),
            config.orchestrator.confirmation_timeout(),
        ));

        info!("Configured {} reward pool(s) over JSON-RPC", contracts.len());
        Ok(Self::build(
            contracts,
            wallet,
            caller,
            Arc::new(SystemClock),
            config.orchestrator.to_runtime(),
            config.automation.to_runtime(),
        ))
    }

    /// Pools backed by the in-memory chain
    pub fn simulated(config: &AppConfig) -> Result<Self> {
        let contracts = config.to_contract_refs()?;
        let chain_id = config
            .wallet_chain_id()
            .ok_or_else(|| ClaimerError::Validation("no pools configured".into()))?;

        let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
        let chain = Arc::new(SimulatedChain::new(clock.clone(), SIMULATED_CONFIRMATION));
        for contract in &contracts {
            chain.fund(
                contract.address,
                contract.per_claim_amount.saturating_mul(U256::from(1_000u64)),
            );
        }
        let wallet = Arc::new(SimulatedWallet::new(SIMULATED_ACCOUNT, chain_id));

        info!(
            "Simulating {} reward pool(s) for {}",
            contracts.len(),
            SIMULATED_ACCOUNT
        );
        Ok(Self::build(
            contracts,
            wallet,
            chain,
            clock,
            config.orchestrator.to_runtime(),
            config.automation.to_runtime(),
        ))
    }

    pub fn pools(&self) -> &[PoolHandle] {
        &self.pools
    }

    pub fn get(&self, name: &str) -> Result<&PoolHandle> {
        self.pools
            .iter()
            .find(|p| p.contract().name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ClaimerError::PoolNotFound(name.to_string()))
    }

    pub fn wallet(&self) -> &Arc<dyn WalletConnection> {
        &self.wallet
    }

    /// Connect the wallet if it is not connected yet.
    pub async fn connect(&self) -> Result<()> {
        if self.wallet.state().connected {
            return Ok(());
        }
        self.wallet.request_connect().await?;
        Ok(())
    }

    /// Refresh every pool's reader for the connected account
    pub async fn refresh_all(&self) {
        let refreshes = self.pools.iter().map(|pool| async move {
            if let Err(e) = pool.orchestrator.refresh().await {
                tracing::warn!("Refresh failed for {}: {}", pool.contract().name, e);
            }
        });
        futures::future::join_all(refreshes).await;
    }

    pub fn spawn_wallet_watches(&self) -> Vec<JoinHandle<()>> {
        self.pools
            .iter()
            .map(|p| p.orchestrator.spawn_wallet_watch())
            .collect()
    }

    /// Run the auto-trigger of each given pool until `shutdown` flips.
    pub fn spawn_auto_triggers(
        pools: &[&PoolHandle],
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        pools
            .iter()
            .map(|p| {
                let trigger = p.auto_trigger.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { trigger.run(shutdown).await })
            })
            .collect()
    }
}
