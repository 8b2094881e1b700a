use alloy::primitives::{Address, U256};
use reward_claimer::adapters::{ScriptedSend, SimulatedChain, SimulatedWallet, WalletConnection};
use reward_claimer::clock::{ClockSource, ManualClock};
use reward_claimer::domain::{
    ClaimSession, ClaimStatus, ContractFlavor, Countdown, Eligibility, RewardContractRef,
    ARBITRUM_CHAIN_ID,
};
use reward_claimer::error::ClaimFailure;
use reward_claimer::services::{
    AutoAction, AutoTriggerConfig, AutoTriggerController, ChainRewardReader, ClaimOrchestrator,
    ClaimRequest, ClaimTransactor, OrchestratorConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const T: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

fn account() -> Address {
    Address::repeat_byte(0x0A)
}

fn pool() -> RewardContractRef {
    RewardContractRef {
        name: "arbitrum".into(),
        address: Address::repeat_byte(0xE4),
        chain_id: ARBITRUM_CHAIN_ID,
        per_claim_amount: U256::from(25_000_000_000_000_000u64),
        decimals: 18,
        symbol: "ARB".into(),
        cooldown_secs: DAY,
        flavor: ContractFlavor::Legacy,
    }
}

struct World {
    clock: Arc<ManualClock>,
    chain: Arc<SimulatedChain>,
    wallet: Arc<SimulatedWallet>,
    transactor: ClaimTransactor,
}

impl World {
    fn new(wallet_chain: u64) -> Self {
        let clock = Arc::new(ManualClock::new(T));
        let chain = Arc::new(SimulatedChain::new(clock.clone(), Duration::from_secs(3)));
        let wallet = Arc::new(SimulatedWallet::new(account(), wallet_chain));
        let transactor = ClaimTransactor::new(chain.clone());
        Self {
            clock,
            chain,
            wallet,
            transactor,
        }
    }

    fn orchestrator(&self) -> ClaimOrchestrator {
        let contract = pool();
        let reader = Arc::new(ChainRewardReader::new(contract.clone(), self.chain.clone()));
        ClaimOrchestrator::new(
            contract,
            self.wallet.clone(),
            reader,
            self.transactor.clone(),
            self.clock.clone(),
            OrchestratorConfig::default(),
        )
    }
}

async fn next_finished(rx: &mut watch::Receiver<Option<ClaimSession>>) -> ClaimSession {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            rx.changed().await.unwrap();
            if let Some(session) = rx.borrow_and_update().clone() {
                return session;
            }
        }
    })
    .await
    .expect("session never finished")
}

#[tokio::test(start_paused = true)]
async fn countdown_boundary_matches_cooldown() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    world.chain.set_last_claim(pool().address, account(), T);
    let orchestrator = world.orchestrator();
    orchestrator.refresh().await.unwrap();

    world.clock.set(T + DAY - 1);
    let countdown = orchestrator.countdown().await.unwrap();
    assert_eq!((countdown.hours, countdown.minutes, countdown.seconds), (0, 0, 1));
    assert_eq!(countdown.to_string(), "0h 0m 1s");

    world.clock.set(T + DAY);
    assert_eq!(orchestrator.eligibility().await, Eligibility::Eligible);
}

#[tokio::test(start_paused = true)]
async fn claim_then_wait_a_day_then_claim_again() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    let orchestrator = world.orchestrator();

    let first = orchestrator.claim_and_wait().await;
    assert_eq!(first.status, ClaimStatus::Confirmed);
    assert_eq!(
        first.receipt.unwrap().claimed_amount,
        Some(pool().per_claim_amount)
    );
    assert_eq!(
        orchestrator.eligibility().await,
        Eligibility::Ineligible(Countdown::from_seconds(DAY))
    );

    world.clock.advance(DAY);
    assert_eq!(orchestrator.eligibility().await, Eligibility::Eligible);

    let second = orchestrator.claim_and_wait().await;
    assert_eq!(second.status, ClaimStatus::Confirmed);
    assert_eq!(world.chain.send_count(), 2);
    assert_eq!(
        world.chain.last_claim(pool().address, account()),
        world.clock.now()
    );
}

#[tokio::test(start_paused = true)]
async fn two_orchestrators_share_one_in_flight_slot() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    let first = world.orchestrator();
    let second = world.orchestrator();
    let mut first_rx = first.subscribe();
    let mut second_finished = second.subscribe_finished();

    assert!(first.claim().is_started());
    // Wait until the first transaction is pending on chain
    loop {
        let status = first_rx.borrow_and_update().status;
        if status == ClaimStatus::Confirming {
            break;
        }
        first_rx.changed().await.unwrap();
    }
    assert!(second.claim().is_started());

    let abandoned = next_finished(&mut second_finished).await;
    assert_eq!(abandoned.status, ClaimStatus::Submitted);
    assert!(abandoned.error.is_none());
    assert_eq!(world.chain.send_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_trigger_claims_once_per_window() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    let orchestrator = world.orchestrator();
    orchestrator.refresh().await.unwrap();
    let controller = AutoTriggerController::new(orchestrator.clone(), AutoTriggerConfig::default());
    let mut finished = orchestrator.subscribe_finished();

    // Eligible: claims
    assert!(matches!(
        controller.tick().await,
        Some(AutoAction::StartedClaim(_))
    ));
    assert_eq!(next_finished(&mut finished).await.status, ClaimStatus::Confirmed);

    // Ineligible after the refresh: nothing to do
    assert_eq!(controller.tick().await, None);

    // Window reopens: claims again
    world.clock.advance(DAY);
    assert!(matches!(
        controller.tick().await,
        Some(AutoAction::StartedClaim(_))
    ));
    assert_eq!(next_finished(&mut finished).await.status, ClaimStatus::Confirmed);

    // Still inside the new window
    assert_eq!(controller.tick().await, None);
    assert_eq!(world.chain.send_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn reverted_auto_claim_is_not_retried_but_manual_claim_works() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    world
        .chain
        .script(ScriptedSend::RevertOnConfirm(Some("paused".into())));
    let orchestrator = world.orchestrator();
    orchestrator.refresh().await.unwrap();
    let controller = AutoTriggerController::new(orchestrator.clone(), AutoTriggerConfig::default());
    let mut finished = orchestrator.subscribe_finished();

    controller.tick().await;
    let failed = next_finished(&mut finished).await;
    assert_eq!(
        failed.error,
        Some(ClaimFailure::ExecutionReverted(Some("paused".into())))
    );

    for _ in 0..3 {
        assert_eq!(controller.tick().await, None);
    }
    assert!(controller.guard().await.has_auto_claimed());
    assert_eq!(world.chain.send_count(), 1);

    assert!(matches!(orchestrator.claim(), ClaimRequest::Started(_)));
    assert_eq!(next_finished(&mut finished).await.status, ClaimStatus::Confirmed);
    assert_eq!(world.chain.send_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn auto_trigger_connects_switches_then_claims() {
    let world = World::new(1);
    let orchestrator = world.orchestrator();
    let _watch = orchestrator.spawn_wallet_watch();
    let controller = AutoTriggerController::new(orchestrator.clone(), AutoTriggerConfig::default());

    assert_eq!(controller.tick().await, Some(AutoAction::RequestedConnect));
    assert_eq!(world.wallet.state().chain_id, Some(1));

    assert_eq!(
        controller.tick().await,
        Some(AutoAction::RequestedSwitch(ARBITRUM_CHAIN_ID))
    );
    assert_eq!(world.wallet.state().chain_id, Some(ARBITRUM_CHAIN_ID));

    // The wallet watch loaded the claim window during the settle delay
    assert!(matches!(
        controller.tick().await,
        Some(AutoAction::StartedClaim(_))
    ));
    assert_eq!(world.wallet.connect_requests(), 1);
    assert_eq!(world.wallet.switch_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_trigger_run_stops_on_shutdown() {
    let world = World::new(ARBITRUM_CHAIN_ID);
    world.wallet.connect_as(account(), ARBITRUM_CHAIN_ID);
    world.chain.set_last_claim(pool().address, account(), T);
    let orchestrator = world.orchestrator();
    let controller = Arc::new(AutoTriggerController::new(
        orchestrator,
        AutoTriggerConfig::default(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown_tx.send_replace(true);

    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("auto-trigger did not stop")
        .unwrap();
    assert_eq!(world.chain.send_count(), 0);
}
