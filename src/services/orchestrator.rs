//! Claim orchestrator
//!
//! Owns the claim session for one reward pool and drives it through
//! connection, chain switch, submission and confirmation. Every claim runs
//! on its own driver task; the session is published through a watch channel
//! so UIs and the auto-trigger observe it without polling.

use alloy::primitives::Address;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{WalletConnection, WalletState};
use crate::clock::ClockSource;
use crate::domain::{
    evaluate, evaluate_for, ClaimReceipt, ClaimSession, ClaimStatus, Countdown, Eligibility,
    Readiness, RewardContractRef, SessionKey, SessionTransition,
};
use crate::error::{ClaimFailure, Result};
use crate::services::reward_reader::{ChainRewardReader, RewardSnapshot};
use crate::services::transactor::{ClaimTransactor, SubmitError};

/// Timing knobs for the session driver
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long to wait for the wallet to connect
    pub connect_timeout: Duration,
    /// How long to wait for a requested chain switch to land
    pub switch_timeout: Duration,
    /// How long `Confirmed` stays visible
    pub success_display: Duration,
    /// How long a visible failure stays up unless acknowledged
    pub failure_display: Duration,
    /// Delay before re-reading a node that still reports the old claim time
    pub refresh_retry_delay: Duration,
    /// Ask the wallet to connect when `claim()` finds it disconnected
    pub request_connect_on_claim: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            switch_timeout: Duration::from_secs(30),
            success_display: Duration::from_secs(2),
            failure_display: Duration::from_secs(4),
            refresh_retry_delay: Duration::from_secs(2),
            request_connect_on_claim: true,
        }
    }
}

/// Result of a `claim()` call
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimRequest {
    /// A new session was started
    Started(Uuid),
    /// A session is already running; nothing was done
    AlreadyInFlight(ClaimSession),
}

impl ClaimRequest {
    pub fn is_started(&self) -> bool {
        matches!(self, ClaimRequest::Started(_))
    }
}

/// How a session driver finished
enum Ending {
    Confirmed {
        account: Address,
        receipt: ClaimReceipt,
    },
    Failed(ClaimFailure),
    /// Dropped without touching the chain
    Abandoned(String),
    /// Wallet context moved on while a transaction was pending
    ContextChanged,
    /// Another actor (cancel, acknowledge) already moved the session
    Superseded,
}

struct Inner {
    contract: RewardContractRef,
    wallet: Arc<dyn WalletConnection>,
    reader: Arc<ChainRewardReader>,
    transactor: ClaimTransactor,
    clock: Arc<dyn ClockSource>,
    config: OrchestratorConfig,
    status_tx: watch::Sender<ClaimSession>,
    finished_tx: watch::Sender<Option<ClaimSession>>,
}

/// Claim state machine for one reward pool
#[derive(Clone)]
pub struct ClaimOrchestrator {
    inner: Arc<Inner>,
}

impl ClaimOrchestrator {
    pub fn new(
        contract: RewardContractRef,
        wallet: Arc<dyn WalletConnection>,
        reader: Arc<ChainRewardReader>,
        transactor: ClaimTransactor,
        clock: Arc<dyn ClockSource>,
        config: OrchestratorConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(ClaimSession::idle(contract.chain_id));
        let (finished_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                contract,
                wallet,
                reader,
                transactor,
                clock,
                config,
                status_tx,
                finished_tx,
            }),
        }
    }

    pub fn contract(&self) -> &RewardContractRef {
        &self.inner.contract
    }

    pub fn reader(&self) -> &Arc<ChainRewardReader> {
        &self.inner.reader
    }

    pub fn wallet(&self) -> &Arc<dyn WalletConnection> {
        &self.inner.wallet
    }

    pub fn wallet_state(&self) -> WalletState {
        self.inner.wallet.state()
    }

    pub fn session(&self) -> ClaimSession {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimSession> {
        self.inner.status_tx.subscribe()
    }

    /// Most recent session that returned to `Idle`, as it looked just before
    pub fn last_finished(&self) -> Option<ClaimSession> {
        self.inner.finished_tx.borrow().clone()
    }

    pub fn subscribe_finished(&self) -> watch::Receiver<Option<ClaimSession>> {
        self.inner.finished_tx.subscribe()
    }

    fn readiness(&self, wallet: &WalletState) -> Readiness {
        wallet.readiness(self.inner.contract.chain_id)
    }

    /// Eligibility of the connected account at the current time
    pub async fn eligibility(&self) -> Eligibility {
        let wallet = self.inner.wallet.state();
        let readiness = self.readiness(&wallet);
        let window = match (readiness, wallet.active_account()) {
            (Readiness::Ready, Some(account)) => self.inner.reader.window_for(account).await,
            _ => None,
        };
        evaluate_for(readiness, window.as_ref(), self.inner.clock.now())
    }

    /// Eligibility of `account` from cached data, whatever chain the wallet is on
    pub async fn eligibility_for(&self, account: Address) -> Eligibility {
        let window = self.inner.reader.window_for(account).await;
        evaluate(window.as_ref(), self.inner.clock.now())
    }

    pub async fn countdown(&self) -> Option<Countdown> {
        self.eligibility().await.countdown()
    }

    /// Re-read the contract for the connected account.
    pub async fn refresh(&self) -> Result<Option<RewardSnapshot>> {
        let wallet = self.inner.wallet.state();
        match (self.readiness(&wallet), wallet.active_account()) {
            (Readiness::Ready, Some(account)) => {
                self.inner.reader.refresh(account).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Start a claim session.
    ///
    /// Never blocks and never errors: outcomes arrive through `subscribe()`.
    /// Must be called from within a tokio runtime.
    pub fn claim(&self) -> ClaimRequest {
        let wallet = self.inner.wallet.state();
        let initial = match self.readiness(&wallet) {
            Readiness::Disconnected => ClaimStatus::AwaitingConnection,
            Readiness::WrongChain => ClaimStatus::AwaitingChainSwitch,
            // Published as `Submitted` once the window check passes
            Readiness::Ready => ClaimStatus::Idle,
        };

        let id = Uuid::new_v4();
        let chain_id = self.inner.contract.chain_id;
        let mut running = None;
        let started = self.inner.status_tx.send_if_modified(|session| {
            if !session.is_idle() {
                running = Some(session.clone());
                return false;
            }
            *session = ClaimSession::begin(id, initial, chain_id, wallet.active_account());
            true
        });

        if !started {
            let running = running.unwrap_or_else(|| self.session());
            debug!(
                "Claim on {} ignored, session {:?} is {}",
                self.inner.contract.name, running.id, running.status
            );
            return ClaimRequest::AlreadyInFlight(running);
        }

        info!(
            "Claim session {} started on {} ({})",
            id,
            self.inner.contract,
            if initial.is_idle() { "checking window" } else { initial.as_str() }
        );
        let this = self.clone();
        tokio::spawn(async move { this.drive(id).await });
        ClaimRequest::Started(id)
    }

    /// Start a claim and wait until its session returns to `Idle`.
    ///
    /// Returns the session as it looked right before the reset.
    pub async fn claim_and_wait(&self) -> ClaimSession {
        let mut finished_rx = self.inner.finished_tx.subscribe();
        let id = match self.claim() {
            ClaimRequest::Started(id) => id,
            ClaimRequest::AlreadyInFlight(session) => return session,
        };
        loop {
            let finished = finished_rx.borrow_and_update().clone();
            if let Some(session) = finished.filter(|s| s.belongs_to(id)) {
                return session;
            }
            if finished_rx.changed().await.is_err() {
                return self.session();
            }
        }
    }

    /// Abandon a session that has not reached the chain yet.
    pub fn cancel(&self) -> bool {
        self.transition_if(
            |s| s.status.is_pre_submission() || s.is_checking(),
            ClaimStatus::Idle,
            "cancelled",
            |_| {},
        )
    }

    /// Dismiss a visible failure before its display window ends.
    pub fn acknowledge(&self) -> bool {
        self.transition_if(
            |s| s.status == ClaimStatus::Failed,
            ClaimStatus::Idle,
            "acknowledged",
            |_| {},
        )
    }

    /// Keep reader data in step with the wallet's account and chain.
    pub fn spawn_wallet_watch(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut wallet_rx = this.inner.wallet.subscribe();
            let mut last_context = None;
            loop {
                let state = *wallet_rx.borrow_and_update();
                let context = state.active_account().map(|a| (a, state.chain_id));
                if context != last_context {
                    last_context = context;
                    this.on_wallet_change(state).await;
                }
                if wallet_rx.changed().await.is_err() {
                    debug!("Wallet watch for {} stopped", this.inner.contract.name);
                    break;
                }
            }
        })
    }

    async fn on_wallet_change(&self, state: WalletState) {
        let account = state.active_account();
        self.inner.reader.select_account(account).await;
        if let (Readiness::Ready, Some(account)) = (self.readiness(&state), account) {
            if let Err(e) = self.inner.reader.refresh(account).await {
                debug!("Refresh after wallet change failed: {}", e);
            }
        }
    }

    fn status_of(&self, id: Uuid) -> Option<ClaimStatus> {
        let session = self.inner.status_tx.borrow();
        session.belongs_to(id).then_some(session.status)
    }

    /// Update session fields without changing its status
    fn annotate(&self, id: Uuid, update: impl FnOnce(&mut ClaimSession)) {
        self.inner.status_tx.send_if_modified(|session| {
            if !session.belongs_to(id) {
                return false;
            }
            update(session);
            session.updated_at = Utc::now();
            true
        });
    }

    fn transition(
        &self,
        id: Uuid,
        to: ClaimStatus,
        reason: &str,
        update: impl FnOnce(&mut ClaimSession),
    ) -> bool {
        self.transition_if(|s| s.belongs_to(id), to, reason, update)
    }

    fn transition_if(
        &self,
        guard: impl FnOnce(&ClaimSession) -> bool,
        to: ClaimStatus,
        reason: &str,
        update: impl FnOnce(&mut ClaimSession),
    ) -> bool {
        let chain_id = self.inner.contract.chain_id;
        let mut event = None;
        let mut finished = None;

        self.inner.status_tx.send_if_modified(|session| {
            if !guard(session) {
                return false;
            }
            let releasing_check = to.is_idle() && session.is_checking();
            if !releasing_check && !session.status.can_transition_to(to) {
                warn!(
                    "Rejected transition {} -> {} ({})",
                    session.status, to, reason
                );
                return false;
            }
            event = Some(SessionTransition::new(session.id, session.status, to, reason));
            if to.is_idle() {
                finished = Some(session.clone());
                *session = ClaimSession::idle(chain_id);
            } else {
                session.status = to;
                update(session);
                session.updated_at = Utc::now();
            }
            true
        });

        if let Some(session) = finished {
            self.inner.finished_tx.send_replace(Some(session));
        }
        match event {
            Some(t) => {
                info!(
                    "[{}] session {:?}: {} -> {} ({})",
                    self.inner.contract.name, t.session_id, t.from, t.to, t.reason
                );
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self), fields(pool = %self.inner.contract.name))]
    async fn drive(self, id: Uuid) {
        let ending = match self.run_session(id).await {
            Ok(ending) | Err(ending) => ending,
        };
        self.finish(id, ending).await;
    }

    async fn run_session(&self, id: Uuid) -> std::result::Result<Ending, Ending> {
        let account = self.await_connection(id).await?;
        self.await_chain(id, account).await?;
        self.check_window(account).await.map_err(Ending::Failed)?;
        self.submit(id, account).await
    }

    async fn await_connection(&self, id: Uuid) -> std::result::Result<Address, Ending> {
        let mut wallet_rx = self.inner.wallet.subscribe();
        let mut status_rx = self.inner.status_tx.subscribe();

        if let Some(account) = wallet_rx.borrow_and_update().active_account() {
            return Ok(account);
        }
        match self.status_of(id) {
            None => return Err(Ending::Superseded),
            Some(ClaimStatus::AwaitingConnection) => {}
            Some(_) => {
                return Err(Ending::Abandoned(
                    "wallet disconnected before the claim started".into(),
                ))
            }
        }

        let wallet = self.inner.wallet.clone();
        let request = async move { wallet.request_connect().await };
        tokio::pin!(request);
        let mut request_pending = self.inner.config.request_connect_on_claim;
        let deadline = tokio::time::sleep(self.inner.config.connect_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut request, if request_pending => {
                    request_pending = false;
                    match result {
                        Ok(()) => debug!("Connection request handled"),
                        Err(failure) => return Err(Ending::Failed(failure)),
                    }
                    if let Some(account) = self.inner.wallet.state().active_account() {
                        return Ok(account);
                    }
                }
                changed = wallet_rx.changed() => {
                    if changed.is_err() {
                        return Err(Ending::Failed(ClaimFailure::NetworkFailure(
                            "wallet adapter closed".into(),
                        )));
                    }
                    let state = *wallet_rx.borrow_and_update();
                    if let Some(account) = state.active_account() {
                        return Ok(account);
                    }
                }
                _ = status_rx.changed() => {
                    if self.status_of(id).is_none() {
                        return Err(Ending::Superseded);
                    }
                }
                _ = &mut deadline => {
                    return Err(Ending::Failed(ClaimFailure::NetworkFailure(
                        "timed out waiting for wallet connection".into(),
                    )));
                }
            }
        }
    }

    async fn await_chain(&self, id: Uuid, account: Address) -> std::result::Result<(), Ending> {
        let target = self.inner.contract.chain_id;
        let mut wallet_rx = self.inner.wallet.subscribe();
        let entry_state = *wallet_rx.borrow_and_update();

        if entry_state.matches(account, target) {
            return Ok(());
        }
        if entry_state.active_account() != Some(account) {
            return Err(Ending::Abandoned("account changed before chain check".into()));
        }

        match self.status_of(id) {
            None => return Err(Ending::Superseded),
            Some(ClaimStatus::AwaitingChainSwitch) => self.annotate(id, |s| s.account = Some(account)),
            Some(ClaimStatus::AwaitingConnection) => {
                if !self.transition(id, ClaimStatus::AwaitingChainSwitch, "wrong chain", |s| {
                    s.account = Some(account)
                }) {
                    return Err(Ending::Superseded);
                }
            }
            Some(_) => {
                return Err(Ending::Abandoned(
                    "chain changed before the claim started".into(),
                ))
            }
        }

        info!(
            "Requesting switch from chain {:?} to {} ({})",
            entry_state.chain_id,
            target,
            self.inner.contract.chain_name()
        );
        let mut status_rx = self.inner.status_tx.subscribe();
        let wallet = self.inner.wallet.clone();
        let request = async move { wallet.request_switch_chain(target).await };
        tokio::pin!(request);
        let mut request_pending = true;
        let deadline = tokio::time::sleep(self.inner.config.switch_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut request, if request_pending => {
                    request_pending = false;
                    match result {
                        Ok(()) => {}
                        Err(ClaimFailure::UserRejected) => {
                            return Err(Ending::Failed(ClaimFailure::UserRejected));
                        }
                        Err(failure) => {
                            return Err(Ending::Failed(ClaimFailure::NetworkFailure(format!(
                                "chain switch failed: {}",
                                failure
                            ))));
                        }
                    }
                    let state = self.inner.wallet.state();
                    if state.matches(account, target) {
                        return Ok(());
                    }
                }
                changed = wallet_rx.changed() => {
                    if changed.is_err() {
                        return Err(Ending::Failed(ClaimFailure::NetworkFailure(
                            "wallet adapter closed".into(),
                        )));
                    }
                    let state = *wallet_rx.borrow_and_update();
                    if state.matches(account, target) {
                        return Ok(());
                    }
                    if state.active_account() != Some(account) {
                        return Err(Ending::Abandoned(
                            "wallet disconnected or account changed during chain switch".into(),
                        ));
                    }
                    if state.chain_id != entry_state.chain_id {
                        return Err(Ending::Abandoned("wallet moved to another chain".into()));
                    }
                }
                _ = status_rx.changed() => {
                    if self.status_of(id).is_none() {
                        return Err(Ending::Superseded);
                    }
                }
                _ = &mut deadline => {
                    return Err(Ending::Failed(ClaimFailure::NetworkFailure(
                        "timed out waiting for chain switch".into(),
                    )));
                }
            }
        }
    }

    /// Last-moment eligibility check against fresh contract data
    async fn check_window(&self, account: Address) -> std::result::Result<(), ClaimFailure> {
        if let Err(e) = self.inner.reader.refresh(account).await {
            debug!("Pre-submission refresh failed, using cached window: {}", e);
        }
        let window = self.inner.reader.window_for(account).await;
        match evaluate(window.as_ref(), self.inner.clock.now()) {
            Eligibility::Eligible => Ok(()),
            Eligibility::Ineligible(countdown) => Err(ClaimFailure::CooldownActive {
                seconds_remaining: countdown.total_seconds,
            }),
            Eligibility::Unknown => Err(ClaimFailure::ReadUnavailable(
                self.inner
                    .reader
                    .last_error()
                    .await
                    .unwrap_or_else(|| "claim window not loaded".into()),
            )),
        }
    }

    async fn submit(&self, id: Uuid, account: Address) -> std::result::Result<Ending, Ending> {
        let target = self.inner.contract.chain_id;

        if !self.transition(id, ClaimStatus::Submitted, "window open", |s| {
            s.account = Some(account)
        }) {
            return Err(Ending::Superseded);
        }

        let mut wallet_rx = self.inner.wallet.subscribe();
        if !wallet_rx.borrow_and_update().matches(account, target) {
            return Err(Ending::Abandoned(
                "wallet context changed before submission".into(),
            ));
        }

        let key = SessionKey {
            chain_id: target,
            contract: self.inner.contract.address,
            account,
        };
        let transactor = self.inner.transactor.clone();
        let contract = self.inner.contract.clone();
        let submission =
            tokio::spawn(async move { transactor.submit(id, key, &contract).await });
        tokio::pin!(submission);
        let mut watching_wallet = true;

        let submitted = loop {
            tokio::select! {
                joined = &mut submission => break joined,
                changed = wallet_rx.changed(), if watching_wallet => {
                    if changed.is_err() {
                        watching_wallet = false;
                        continue;
                    }
                    if !wallet_rx.borrow_and_update().matches(account, target) {
                        return Err(Ending::ContextChanged);
                    }
                }
            }
        };

        let mut handle = match submitted {
            Ok(Ok(handle)) => handle,
            Ok(Err(SubmitError::Failed(failure))) => return Err(Ending::Failed(failure)),
            Ok(Err(SubmitError::AlreadyInFlight { session_id, .. })) => {
                return Err(Ending::Abandoned(format!(
                    "session {} already holds this claim",
                    session_id
                )))
            }
            Err(e) => {
                return Err(Ending::Failed(ClaimFailure::NetworkFailure(format!(
                    "submission task failed: {}",
                    e
                ))))
            }
        };

        let tx_hash = handle.tx_hash;
        if !self.transition(id, ClaimStatus::Confirming, "transaction sent", |s| {
            s.tx_hash = Some(tx_hash)
        }) {
            return Err(Ending::Superseded);
        }

        let outcome = handle.outcome();
        tokio::pin!(outcome);
        let result = loop {
            tokio::select! {
                result = &mut outcome => break result,
                changed = wallet_rx.changed(), if watching_wallet => {
                    if changed.is_err() {
                        watching_wallet = false;
                        continue;
                    }
                    if !wallet_rx.borrow_and_update().matches(account, target) {
                        info!("Wallet context changed, {} continues unobserved", tx_hash);
                        return Err(Ending::ContextChanged);
                    }
                }
            }
        };

        match result {
            Ok(receipt) => Ok(Ending::Confirmed { account, receipt }),
            Err(failure) => Err(Ending::Failed(failure)),
        }
    }

    async fn finish(&self, id: Uuid, ending: Ending) {
        match ending {
            Ending::Superseded => {
                debug!("Session {} was superseded", id);
            }
            Ending::Abandoned(reason) => {
                self.transition(id, ClaimStatus::Idle, &reason, |_| {});
            }
            Ending::ContextChanged => {
                self.transition(id, ClaimStatus::Idle, "wallet context changed", |_| {});
            }
            Ending::Failed(failure) => {
                let silent = failure.is_silent();
                if silent {
                    info!("Claim rejected in wallet");
                } else {
                    warn!("Claim failed on {}: {}", self.inner.contract.name, failure);
                }
                let kind = failure.kind();
                let failed = self.transition(id, ClaimStatus::Failed, kind, |s| {
                    s.error = Some(failure)
                });
                if failed && !silent {
                    self.hold(id, self.inner.config.failure_display).await;
                }
                let reason = if failed { "failure cleared" } else { kind };
                self.transition(id, ClaimStatus::Idle, reason, |_| {});
            }
            Ending::Confirmed { account, receipt } => {
                if let Some(amount) = receipt.claimed_amount {
                    info!(
                        "Claimed {} on {}",
                        self.inner.contract.display_amount(amount),
                        self.inner.contract.name
                    );
                }
                if !self.transition(id, ClaimStatus::Confirmed, "receipt confirmed", |s| {
                    s.receipt = Some(receipt)
                }) {
                    return;
                }
                self.refresh_after_confirmation(account).await;
                self.hold(id, self.inner.config.success_display).await;
                self.transition(id, ClaimStatus::Idle, "success shown", |_| {});
            }
        }
    }

    /// Re-read the claim time, retrying once if the node lags behind the receipt.
    async fn refresh_after_confirmation(&self, account: Address) {
        let cooldown = self.inner.contract.cooldown_secs;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(self.inner.config.refresh_retry_delay).await;
            }
            match self.inner.reader.refresh(account).await {
                Ok(snapshot) => {
                    let verdict = evaluate(Some(&snapshot.window(cooldown)), self.inner.clock.now());
                    if !verdict.is_eligible() {
                        debug!("Post-claim refresh: {}", verdict);
                        return;
                    }
                    debug!("Node still reports the previous claim time");
                }
                Err(e) => warn!("Post-claim refresh failed: {}", e),
            }
        }
    }

    /// Wait out a display window, or until someone else moves the session.
    async fn hold(&self, id: Uuid, duration: Duration) {
        let mut status_rx = self.inner.status_tx.subscribe();
        let released = async {
            loop {
                if !status_rx.borrow_and_update().belongs_to(id) {
                    break;
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = released => {}
        }
    }
}
