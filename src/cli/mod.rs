//! reward-claimer CLI
//!
//! Commands:
//! - `reward-claimer status` - Eligibility and countdown per pool
//! - `reward-claimer claim`  - Claim from one or all pools
//! - `reward-claimer watch`  - Live countdown, optionally auto-claiming
//! - `reward-claimer config` - Print the effective configuration

pub mod claim;
pub mod config;
pub mod output;
pub mod status;
pub mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Daily reward claimer for on-chain reward pools
#[derive(Parser, Debug)]
#[command(name = "reward-claimer")]
#[command(author, version, about = "Claim daily on-chain rewards when the cooldown allows")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration directory (default.toml, {CLAIMER_ENV}.toml)
    #[arg(short, long, global = true, default_value = "config", env = "CLAIMER_CONFIG_DIR")]
    pub config: PathBuf,

    /// Use an in-memory chain instead of JSON-RPC
    #[arg(long, global = true)]
    pub simulate: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show eligibility, countdown and amounts for each pool
    Status {
        /// Only this pool
        #[arg(short, long)]
        pool: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Claim now (switching chains as needed)
    Claim {
        /// Only this pool; every eligible pool otherwise
        #[arg(short, long)]
        pool: Option<String>,
    },

    /// Follow countdowns until Ctrl+C
    Watch {
        /// Only this pool
        #[arg(short, long)]
        pool: Option<String>,
        /// Connect, switch and claim automatically
        #[arg(long)]
        auto: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
