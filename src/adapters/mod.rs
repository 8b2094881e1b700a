pub mod evm;
pub mod simulated;
pub mod traits;

pub use evm::{EvmContractClient, EvmWallet};
pub use simulated::{ScriptedSend, SimulatedChain, SimulatedWallet};
pub use traits::{ContractCaller, WalletConnection, WalletState};
