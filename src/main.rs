use clap::Parser;
use reward_claimer::cli::{self, output::OutputMode, Cli, Commands};
use reward_claimer::config::AppConfig;
use tracing::info;

mod main_runtime;

use main_runtime::{create_pool_set, init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    match &cli.command {
        Commands::Watch { .. } => init_logging(&config.logging),
        _ => init_logging_simple(),
    }

    if let Commands::Config = cli.command {
        return cli::config::run(&config);
    }

    let set = create_pool_set(&config, cli.simulate)?;
    info!(
        "Loaded {} pool(s) from {}{}",
        set.pools().len(),
        cli.config.display(),
        if cli.simulate { " (simulated)" } else { "" }
    );

    match cli.command {
        Commands::Status { pool, json } => {
            cli::status::run(&set, pool.as_deref(), OutputMode::from(json)).await
        }
        Commands::Claim { pool } => cli::claim::run(&set, pool.as_deref()).await,
        Commands::Watch { pool, auto } => {
            cli::watch::run(&set, pool.as_deref(), auto || config.automation.enabled).await
        }
        Commands::Config => Ok(()),
    }
}
