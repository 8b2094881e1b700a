pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod signing;

pub use adapters::{ContractCaller, WalletConnection, WalletState};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::AppConfig;
pub use domain::{
    evaluate, ClaimSession, ClaimStatus, ClaimWindow, Countdown, Eligibility, RewardContractRef,
};
pub use error::{ClaimFailure, ClaimerError, Result};
pub use services::{
    AutoTriggerController, AutomationGuard, ChainRewardReader, ClaimOrchestrator, ClaimRequest,
    ClaimTransactor, PoolSet,
};
pub use signing::Wallet;
