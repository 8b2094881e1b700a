//! Automatic connect / switch / claim
//!
//! `AutomationGuard` is the pure decision part: given the wallet, the
//! eligibility verdict and whether a session is running, it picks at most
//! one step and remembers what it already tried. `AutoTriggerController`
//! ticks the guard against a live orchestrator.
//!
//! Pools that share a wallet share one `AutomationLease`. Switching the
//! wallet's chain or starting a claim requires holding it, so one pool's
//! automation never pulls the wallet away from another pool mid-claim.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::WalletState;
use crate::domain::{Eligibility, EligibilityKind, Readiness};
use crate::error::ClaimFailure;
use crate::services::orchestrator::{ClaimOrchestrator, ClaimRequest};

/// Which automatic steps are enabled, and pacing
#[derive(Debug, Clone)]
pub struct AutoTriggerConfig {
    pub auto_connect: bool,
    pub auto_switch: bool,
    pub auto_claim: bool,
    /// Pause after any automatic action
    pub settle_delay: Duration,
    pub tick_interval: Duration,
    /// A lease not renewed for this long may be taken by another pool
    pub lease_timeout: Duration,
}

impl Default for AutoTriggerConfig {
    fn default() -> Self {
        Self {
            auto_connect: true,
            auto_switch: true,
            auto_claim: true,
            settle_delay: Duration::from_millis(1500),
            tick_interval: Duration::from_secs(1),
            lease_timeout: Duration::from_secs(120),
        }
    }
}

/// What the guard sees on one tick
#[derive(Debug, Clone, Copy)]
pub struct AutoInput {
    pub wallet: WalletState,
    pub target_chain: u64,
    /// Verdict for a claim right now; `Unknown` unless the wallet is ready
    pub eligibility: Eligibility,
    /// Cached window of the connected account, whatever chain the wallet is on
    pub window: Eligibility,
    pub session_idle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStep {
    Connect,
    SwitchChain(u64),
    Claim,
}

impl AutoStep {
    /// Steps that move or use the shared wallet
    pub fn needs_lease(self) -> bool {
        matches!(self, AutoStep::SwitchChain(_) | AutoStep::Claim)
    }
}

/// Outcome of an automatic step
#[derive(Debug, Clone, PartialEq)]
pub enum AutoAction {
    RequestedConnect,
    RequestedSwitch(u64),
    StartedClaim(Uuid),
    Failed { step: AutoStep, failure: ClaimFailure },
    /// A session appeared between planning and claiming
    ClaimSkipped,
    /// Another pool holds the wallet lease
    Deferred { holder: String },
}

/// Memory of automatic attempts and their reset rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomationGuard {
    has_attempted_auto_connect: bool,
    /// (account, chain) mismatch a switch was already requested for
    attempted_switch_for: Option<(Address, Option<u64>)>,
    has_auto_claimed: bool,
    last_known: Option<EligibilityKind>,
    last_account: Option<Address>,
}

impl AutomationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_auto_claimed(&self) -> bool {
        self.has_auto_claimed
    }

    pub fn has_attempted_auto_connect(&self) -> bool {
        self.has_attempted_auto_connect
    }

    /// Apply reset rules for the latest observation.
    ///
    /// `Ineligible -> Eligible` clears the claim flag; `Unknown` in between
    /// is ignored. A different account clears everything tied to the old one.
    pub fn observe(&mut self, wallet: &WalletState, eligibility: Eligibility) {
        if let Some(account) = wallet.active_account() {
            if self.last_account.is_some_and(|last| last != account) {
                debug!("Account changed to {}, resetting automation guard", account);
                self.has_auto_claimed = false;
                self.last_known = None;
                self.attempted_switch_for = None;
            }
            self.last_account = Some(account);
        }

        match eligibility.kind() {
            EligibilityKind::Unknown => {}
            EligibilityKind::Eligible => {
                if self.last_known == Some(EligibilityKind::Ineligible) {
                    debug!("Claim window reopened, automatic claim re-armed");
                    self.has_auto_claimed = false;
                }
                self.last_known = Some(EligibilityKind::Eligible);
            }
            EligibilityKind::Ineligible => {
                self.last_known = Some(EligibilityKind::Ineligible);
            }
        }
    }

    /// Pick at most one step for this tick and record it as attempted.
    pub fn plan(&mut self, input: &AutoInput, config: &AutoTriggerConfig) -> Option<AutoStep> {
        self.observe(&input.wallet, input.window);

        match input.wallet.readiness(input.target_chain) {
            Readiness::Disconnected => {
                if !config.auto_connect || self.has_attempted_auto_connect {
                    return None;
                }
                self.has_attempted_auto_connect = true;
                Some(AutoStep::Connect)
            }
            Readiness::WrongChain => {
                let account = input.wallet.active_account()?;
                let mismatch = (account, input.wallet.chain_id);
                if !config.auto_switch || self.attempted_switch_for == Some(mismatch) {
                    return None;
                }
                // Nothing to claim over there; leave the wallet where it is
                if config.auto_claim && !self.wants_claim(input.window) {
                    return None;
                }
                self.attempted_switch_for = Some(mismatch);
                Some(AutoStep::SwitchChain(input.target_chain))
            }
            Readiness::Ready => {
                // Another pool may move the wallet away; switching back is allowed again
                self.attempted_switch_for = None;
                if !config.auto_claim
                    || self.has_auto_claimed
                    || !input.session_idle
                    || !input.eligibility.is_eligible()
                {
                    return None;
                }
                self.has_auto_claimed = true;
                Some(AutoStep::Claim)
            }
        }
    }

    /// An automatic claim is still expected for this window.
    pub fn has_pending_claim(&self, input: &AutoInput, config: &AutoTriggerConfig) -> bool {
        config.auto_claim
            && input.wallet.readiness(input.target_chain) == Readiness::Ready
            && self.wants_claim(input.eligibility)
    }

    fn wants_claim(&self, eligibility: Eligibility) -> bool {
        !self.has_auto_claimed && eligibility.kind() != EligibilityKind::Ineligible
    }

    /// The planned claim did not start; allow it again.
    pub fn claim_not_started(&mut self) {
        self.has_auto_claimed = false;
    }
}

#[derive(Debug)]
struct LeaseHolder {
    pool: String,
    renewed_at: Instant,
}

/// Exclusive right to move or use a wallet shared by several pools
#[derive(Debug, Clone)]
pub struct AutomationLease {
    holder: Arc<Mutex<Option<LeaseHolder>>>,
    stale_after: Duration,
}

impl AutomationLease {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            holder: Arc::new(Mutex::new(None)),
            stale_after,
        }
    }

    pub async fn holder(&self) -> Option<String> {
        self.holder.lock().await.as_ref().map(|h| h.pool.clone())
    }

    /// Take the lease for `pool`, or renew it if `pool` already holds it.
    ///
    /// Returns the current holder when another pool has it.
    pub async fn try_acquire(&self, pool: &str) -> Result<(), String> {
        let mut holder = self.holder.lock().await;
        if let Some(current) = holder.as_ref() {
            if current.pool != pool {
                if current.renewed_at.elapsed() < self.stale_after {
                    return Err(current.pool.clone());
                }
                warn!(
                    "Wallet lease held by {} went stale, taken over by {}",
                    current.pool, pool
                );
            }
        } else {
            debug!("Wallet lease taken by {}", pool);
        }
        *holder = Some(LeaseHolder {
            pool: pool.to_string(),
            renewed_at: Instant::now(),
        });
        Ok(())
    }

    /// Give the lease back if `pool` holds it.
    pub async fn release(&self, pool: &str) {
        let mut holder = self.holder.lock().await;
        if holder.as_ref().is_some_and(|h| h.pool == pool) {
            debug!("Wallet lease released by {}", pool);
            *holder = None;
        }
    }
}

/// Runs the guard against one orchestrator
pub struct AutoTriggerController {
    orchestrator: ClaimOrchestrator,
    guard: Mutex<AutomationGuard>,
    config: AutoTriggerConfig,
    lease: AutomationLease,
}

impl AutoTriggerController {
    /// Controller with a lease of its own, for a wallet no other pool uses
    pub fn new(orchestrator: ClaimOrchestrator, config: AutoTriggerConfig) -> Self {
        let lease = AutomationLease::new(config.lease_timeout);
        Self::with_lease(orchestrator, config, lease)
    }

    pub fn with_lease(
        orchestrator: ClaimOrchestrator,
        config: AutoTriggerConfig,
        lease: AutomationLease,
    ) -> Self {
        Self {
            orchestrator,
            guard: Mutex::new(AutomationGuard::new()),
            config,
            lease,
        }
    }

    pub async fn guard(&self) -> AutomationGuard {
        self.guard.lock().await.clone()
    }

    async fn input(&self) -> AutoInput {
        let wallet = self.orchestrator.wallet_state();
        let window = match wallet.active_account() {
            Some(account) => self.orchestrator.eligibility_for(account).await,
            None => Eligibility::Unknown,
        };
        AutoInput {
            wallet,
            target_chain: self.orchestrator.contract().chain_id,
            eligibility: self.orchestrator.eligibility().await,
            window,
            session_idle: self.orchestrator.session().is_idle(),
        }
    }

    /// One automation tick. At most one action, followed by the settle delay.
    pub async fn tick(&self) -> Option<AutoAction> {
        let input = self.input().await;
        let pool = &self.orchestrator.contract().name;

        let step = {
            let mut guard = self.guard.lock().await;
            let mut next = guard.clone();
            let planned = next.plan(&input, &self.config);
            match planned {
                Some(step) if step.needs_lease() => {
                    if let Err(holder) = self.lease.try_acquire(pool).await {
                        debug!("[{}] Automatic {:?} waits for {}", pool, step, holder);
                        guard.observe(&input.wallet, input.window);
                        return Some(AutoAction::Deferred { holder });
                    }
                }
                Some(_) => {}
                None if !input.session_idle => {
                    // A running session keeps the wallet; take or renew the lease
                    let _ = self.lease.try_acquire(pool).await;
                }
                None => {
                    if !next.has_pending_claim(&input, &self.config) {
                        self.lease.release(pool).await;
                    }
                }
            }
            *guard = next;
            planned?
        };
        let wallet = self.orchestrator.wallet();

        let action = match step {
            AutoStep::Connect => {
                info!("[{}] Auto-connecting wallet", pool);
                match wallet.request_connect().await {
                    Ok(()) => AutoAction::RequestedConnect,
                    Err(failure) => AutoAction::Failed { step, failure },
                }
            }
            AutoStep::SwitchChain(chain_id) => {
                info!("[{}] Auto-switching wallet to chain {}", pool, chain_id);
                match wallet.request_switch_chain(chain_id).await {
                    Ok(()) => AutoAction::RequestedSwitch(chain_id),
                    Err(failure) => AutoAction::Failed { step, failure },
                }
            }
            AutoStep::Claim => match self.orchestrator.claim() {
                ClaimRequest::Started(id) => {
                    info!("[{}] Auto-claim started ({})", pool, id);
                    AutoAction::StartedClaim(id)
                }
                ClaimRequest::AlreadyInFlight(_) => {
                    self.guard.lock().await.claim_not_started();
                    AutoAction::ClaimSkipped
                }
            },
        };

        if let AutoAction::Failed { step, failure } = &action {
            if failure.is_silent() {
                debug!("[{}] Automatic {:?} rejected in wallet", pool, step);
            } else {
                warn!("[{}] Automatic {:?} failed: {}", pool, step, failure);
            }
        }

        tokio::time::sleep(self.config.settle_delay).await;
        Some(action)
    }

    /// Tick until `shutdown` flips to true or its sender goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Auto-trigger running for {} (connect={}, switch={}, claim={})",
            self.orchestrator.contract().name,
            self.config.auto_connect,
            self.config.auto_switch,
            self.config.auto_claim
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(action) = self.tick().await {
                        debug!("Auto-trigger action: {:?}", action);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.lease.release(&self.orchestrator.contract().name).await;
        info!("Auto-trigger stopped for {}", self.orchestrator.contract().name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Countdown;

    const TARGET: u64 = 42161;

    fn account(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn ready_input(eligibility: Eligibility) -> AutoInput {
        AutoInput {
            wallet: WalletState::connected(account(1), TARGET),
            target_chain: TARGET,
            eligibility,
            window: eligibility,
            session_idle: true,
        }
    }

    fn ineligible() -> Eligibility {
        Eligibility::Ineligible(Countdown::from_seconds(3_600))
    }

    fn count_claims(guard: &mut AutomationGuard, sequence: &[Eligibility]) -> usize {
        let config = AutoTriggerConfig::default();
        sequence
            .iter()
            .filter(|e| guard.plan(&ready_input(**e), &config) == Some(AutoStep::Claim))
            .count()
    }

    #[test]
    fn test_reopened_window_claims_again() {
        let mut guard = AutomationGuard::new();
        let sequence = [
            Eligibility::Eligible,
            Eligibility::Eligible,
            ineligible(),
            Eligibility::Eligible,
        ];
        assert_eq!(count_claims(&mut guard, &sequence), 2);
    }

    #[test]
    fn test_unknown_between_states_is_ignored() {
        let mut guard = AutomationGuard::new();
        let sequence = [
            Eligibility::Eligible,
            Eligibility::Unknown,
            Eligibility::Eligible,
            ineligible(),
            Eligibility::Unknown,
            Eligibility::Eligible,
        ];
        assert_eq!(count_claims(&mut guard, &sequence), 2);
    }

    #[test]
    fn test_failed_claim_stays_claimed() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        assert_eq!(
            guard.plan(&ready_input(Eligibility::Eligible), &config),
            Some(AutoStep::Claim)
        );
        // A reverted claim leaves the window open; no retry loop
        for _ in 0..5 {
            assert_eq!(guard.plan(&ready_input(Eligibility::Eligible), &config), None);
        }
        assert!(guard.has_auto_claimed());
    }

    #[test]
    fn test_account_change_rearms_claim() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        guard.plan(&ready_input(Eligibility::Eligible), &config);

        let other = AutoInput {
            wallet: WalletState::connected(account(2), TARGET),
            ..ready_input(Eligibility::Eligible)
        };
        assert_eq!(guard.plan(&other, &config), Some(AutoStep::Claim));
    }

    #[test]
    fn test_connect_attempted_once() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        let input = AutoInput {
            wallet: WalletState::disconnected(),
            target_chain: TARGET,
            eligibility: Eligibility::Unknown,
            window: Eligibility::Unknown,
            session_idle: true,
        };
        assert_eq!(guard.plan(&input, &config), Some(AutoStep::Connect));
        assert_eq!(guard.plan(&input, &config), None);
    }

    #[test]
    fn test_switch_once_per_mismatch() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        let on_mainnet = AutoInput {
            wallet: WalletState::connected(account(1), 1),
            target_chain: TARGET,
            eligibility: Eligibility::Unknown,
            window: Eligibility::Unknown,
            session_idle: true,
        };
        let on_base = AutoInput {
            wallet: WalletState::connected(account(1), 8453),
            ..on_mainnet
        };

        assert_eq!(
            guard.plan(&on_mainnet, &config),
            Some(AutoStep::SwitchChain(TARGET))
        );
        assert_eq!(guard.plan(&on_mainnet, &config), None);
        assert_eq!(
            guard.plan(&on_base, &config),
            Some(AutoStep::SwitchChain(TARGET))
        );
    }

    #[test]
    fn test_busy_session_blocks_claim() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        let busy = AutoInput {
            session_idle: false,
            ..ready_input(Eligibility::Eligible)
        };
        assert_eq!(guard.plan(&busy, &config), None);
        assert!(!guard.has_auto_claimed());
    }

    #[test]
    fn test_disabled_steps_do_nothing() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig {
            auto_connect: false,
            auto_switch: false,
            auto_claim: false,
            ..AutoTriggerConfig::default()
        };
        assert_eq!(guard.plan(&ready_input(Eligibility::Eligible), &config), None);
        let disconnected = AutoInput {
            wallet: WalletState::disconnected(),
            ..ready_input(Eligibility::Unknown)
        };
        assert_eq!(guard.plan(&disconnected, &config), None);
    }

    #[test]
    fn test_switch_rearmed_after_wallet_was_ready() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        let elsewhere = AutoInput {
            wallet: WalletState::connected(account(1), 8453),
            target_chain: TARGET,
            eligibility: Eligibility::Unknown,
            window: Eligibility::Unknown,
            session_idle: true,
        };

        assert_eq!(
            guard.plan(&elsewhere, &config),
            Some(AutoStep::SwitchChain(TARGET))
        );
        // Ready on the target chain, window still loading
        assert_eq!(guard.plan(&ready_input(Eligibility::Unknown), &config), None);
        // Another pool moved the wallet back to the same chain
        assert_eq!(
            guard.plan(&elsewhere, &config),
            Some(AutoStep::SwitchChain(TARGET))
        );
    }

    #[test]
    fn test_no_switch_while_window_closed() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        let closed = AutoInput {
            wallet: WalletState::connected(account(1), 8453),
            target_chain: TARGET,
            eligibility: Eligibility::Unknown,
            window: ineligible(),
            session_idle: true,
        };
        assert_eq!(guard.plan(&closed, &config), None);

        // The switch was not spent while there was nothing to claim
        let reopened = AutoInput {
            window: Eligibility::Eligible,
            ..closed
        };
        assert_eq!(
            guard.plan(&reopened, &config),
            Some(AutoStep::SwitchChain(TARGET))
        );
    }

    #[test]
    fn test_no_switch_back_after_claiming() {
        let mut guard = AutomationGuard::new();
        let config = AutoTriggerConfig::default();
        assert_eq!(
            guard.plan(&ready_input(Eligibility::Eligible), &config),
            Some(AutoStep::Claim)
        );
        let elsewhere = AutoInput {
            wallet: WalletState::connected(account(1), 8453),
            eligibility: Eligibility::Unknown,
            window: Eligibility::Eligible,
            ..ready_input(Eligibility::Eligible)
        };
        assert_eq!(guard.plan(&elsewhere, &config), None);
        assert!(!guard.has_pending_claim(&ready_input(Eligibility::Eligible), &config));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_is_exclusive_until_released() {
        let lease = AutomationLease::new(Duration::from_secs(120));
        assert_eq!(lease.try_acquire("arbitrum").await, Ok(()));
        assert_eq!(lease.try_acquire("arbitrum").await, Ok(()));
        assert_eq!(lease.try_acquire("base").await, Err("arbitrum".to_string()));

        // Only the holder can release it
        lease.release("base").await;
        assert_eq!(lease.holder().await.as_deref(), Some("arbitrum"));
        lease.release("arbitrum").await;
        assert_eq!(lease.try_acquire("base").await, Ok(()));
        assert_eq!(lease.holder().await.as_deref(), Some("base"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lease_is_taken_over() {
        let lease = AutomationLease::new(Duration::from_secs(120));
        lease.try_acquire("arbitrum").await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(lease.try_acquire("base").await.is_err());

        // Renewal restarts the timeout
        lease.try_acquire("arbitrum").await.unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(lease.try_acquire("base").await.is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(lease.try_acquire("base").await, Ok(()));
    }
}
