use crate::error::{ClaimerError, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::info;
use zeroize::Zeroize;

/// Local signer used to send claim transactions
///
/// # Security
/// The private key is only held long enough to build the signer and is then
/// zeroized. It is never stored in the Wallet struct.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Create a wallet from a private key hex string
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let mut secure_key = private_key.trim().trim_start_matches("0x").to_string();

        let parsed = secure_key.parse::<PrivateKeySigner>();
        secure_key.zeroize();

        let signer =
            parsed.map_err(|e| ClaimerError::Wallet(format!("Invalid private key: {}", e)))?;

        info!(
            "Wallet initialized: {} (private key zeroized from memory)",
            signer.address()
        );

        Ok(Self { signer })
    }

    /// Create a wallet from the environment variable `var`
    pub fn from_env(var: &str) -> Result<Self> {
        let mut private_key = std::env::var(var)
            .map_err(|_| ClaimerError::Wallet(format!("{} environment variable not set", var)))?;

        let result = Self::from_private_key(&private_key);
        private_key.zeroize();

        result
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signing wallet for alloy providers
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish()
    }
}
