use alloy::primitives::{Address, U256};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::domain::{ContractFlavor, RewardContractRef, DEFAULT_COOLDOWN_SECS};
use crate::error::{ClaimerError, Result};
use crate::services::{AutoTriggerConfig, OrchestratorConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reward pools, one orchestrator each
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub automation: AutomationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name used on the CLI (e.g. "arbitrum")
    pub name: String,
    /// Reward contract address
    pub address: String,
    pub chain_id: u64,
    /// JSON-RPC endpoint for `chain_id`
    pub rpc_url: String,
    /// Per-claim amount in base units, as a decimal string
    pub per_claim_amount: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    pub symbol: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub flavor: ContractFlavor,
}

fn default_decimals() -> u8 {
    18
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

impl PoolConfig {
    pub fn to_contract_ref(&self) -> Result<RewardContractRef> {
        let address: Address = self.address.parse().map_err(|e| {
            ClaimerError::AddressParsing(format!("pool {}: {} ({})", self.name, self.address, e))
        })?;
        let per_claim_amount = U256::from_str_radix(self.per_claim_amount.trim(), 10)
            .map_err(|e| {
                ClaimerError::Validation(format!(
                    "pool {}: per_claim_amount {:?} is not an integer ({})",
                    self.name, self.per_claim_amount, e
                ))
            })?;

        Ok(RewardContractRef {
            name: self.name.clone(),
            address,
            chain_id: self.chain_id,
            per_claim_amount,
            decimals: self.decimals,
            symbol: self.symbol.clone(),
            cooldown_secs: self.cooldown_secs,
            flavor: self.flavor,
        })
    }

    pub fn rpc_url(&self) -> Result<Url> {
        Url::parse(&self.rpc_url).map_err(|e| {
            ClaimerError::Validation(format!("pool {}: invalid rpc_url ({})", self.name, e))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the signer's private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// Chain the wallet connects on; first pool's chain when unset
    #[serde(default)]
    pub default_chain_id: Option<u64>,
}

fn default_private_key_env() -> String {
    "CLAIMER_PRIVATE_KEY".to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
            default_chain_id: None,
        }
    }
}

/// Claim flow timing, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub connect_timeout_ms: u64,
    pub switch_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub success_display_ms: u64,
    pub failure_display_ms: u64,
    pub refresh_retry_delay_ms: u64,
    pub request_connect_on_claim: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 60_000,
            switch_timeout_ms: 30_000,
            confirmation_timeout_ms: 120_000,
            receipt_poll_interval_ms: 1_000,
            success_display_ms: 2_000,
            failure_display_ms: 4_000,
            refresh_retry_delay_ms: 2_000,
            request_connect_on_claim: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn to_runtime(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            switch_timeout: Duration::from_millis(self.switch_timeout_ms),
            success_display: Duration::from_millis(self.success_display_ms),
            failure_display: Duration::from_millis(self.failure_display_ms),
            refresh_retry_delay: Duration::from_millis(self.refresh_retry_delay_ms),
            request_connect_on_claim: self.request_connect_on_claim,
        }
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Automatic connect / switch / claim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Run the auto-trigger in `watch` without `--auto`
    pub enabled: bool,
    pub auto_connect: bool,
    pub auto_switch: bool,
    pub auto_claim: bool,
    pub settle_delay_ms: u64,
    pub tick_interval_ms: u64,
    /// Wallet lease shared by the pools goes stale after this long
    pub lease_timeout_secs: u64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_connect: true,
            auto_switch: true,
            auto_claim: true,
            settle_delay_ms: 1_500,
            tick_interval_ms: 1_000,
            lease_timeout_secs: 120,
        }
    }
}

impl AutomationSettings {
    pub fn to_runtime(&self) -> AutoTriggerConfig {
        AutoTriggerConfig {
            auto_connect: self.auto_connect,
            auto_switch: self.auto_switch,
            auto_claim: self.auto_claim,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            lease_timeout: Duration::from_secs(self.lease_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("wallet.private_key_env", default_private_key_env())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CLAIMER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CLAIMER_AUTOMATION__ENABLED, etc.)
            .add_source(
                Environment::with_prefix("CLAIMER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Chain the wallet connects on first
    pub fn wallet_chain_id(&self) -> Option<u64> {
        self.wallet
            .default_chain_id
            .or_else(|| self.pools.first().map(|p| p.chain_id))
    }

    /// One endpoint per chain; the first pool naming a chain wins
    pub fn rpc_urls(&self) -> Result<HashMap<u64, Url>> {
        let mut urls = HashMap::new();
        for pool in &self.pools {
            if !urls.contains_key(&pool.chain_id) {
                urls.insert(pool.chain_id, pool.rpc_url()?);
            }
        }
        Ok(urls)
    }

    pub fn to_contract_refs(&self) -> Result<Vec<RewardContractRef>> {
        self.pools.iter().map(PoolConfig::to_contract_ref).collect()
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pools.is_empty() {
            errors.push("at least one [[pools]] entry is required".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.name.to_ascii_lowercase()) {
                errors.push(format!("duplicate pool name: {}", pool.name));
            }
            if let Err(e) = pool.to_contract_ref() {
                errors.push(e.to_string());
            }
            if let Err(e) = pool.rpc_url() {
                errors.push(e.to_string());
            }
            if pool.chain_id == 0 {
                errors.push(format!("pool {}: chain_id must be non-zero", pool.name));
            }
            if pool.cooldown_secs == 0 {
                errors.push(format!("pool {}: cooldown_secs must be positive", pool.name));
            }
        }

        if let Some(chain_id) = self.wallet.default_chain_id {
            if !self.pools.iter().any(|p| p.chain_id == chain_id) {
                errors.push(format!(
                    "wallet.default_chain_id {} has no configured pool",
                    chain_id
                ));
            }
        }

        if self.wallet.private_key_env.trim().is_empty() {
            errors.push("wallet.private_key_env must name an environment variable".to_string());
        }

        let o = &self.orchestrator;
        if o.receipt_poll_interval_ms == 0 {
            errors.push("orchestrator.receipt_poll_interval_ms must be positive".to_string());
        }
        if o.confirmation_timeout_ms < o.receipt_poll_interval_ms {
            errors.push(
                "orchestrator.confirmation_timeout_ms should be at least one poll interval"
                    .to_string(),
            );
        }
        if o.connect_timeout_ms == 0 || o.switch_timeout_ms == 0 {
            errors.push("orchestrator connect/switch timeouts must be positive".to_string());
        }

        if self.automation.tick_interval_ms == 0 {
            errors.push("automation.tick_interval_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
