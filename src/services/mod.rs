pub mod auto_trigger;
pub mod orchestrator;
pub mod pool_set;
pub mod reward_reader;
pub mod transactor;

pub use auto_trigger::{
    AutoAction, AutoInput, AutoStep, AutoTriggerConfig, AutoTriggerController, AutomationGuard,
    AutomationLease,
};
pub use orchestrator::{ClaimOrchestrator, ClaimRequest, OrchestratorConfig};
pub use pool_set::{PoolHandle, PoolSet, SIMULATED_ACCOUNT};
pub use reward_reader::{ChainRewardReader, RewardSnapshot};
pub use transactor::{ClaimTransactor, SubmitError, TransactionHandle, TxLifecycle};
