//! `reward-claimer watch`: follow countdowns, optionally auto-claiming.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use super::claim;
use super::output::{self, Tone};
use super::status::select_pools;
use crate::domain::Eligibility;
use crate::services::{PoolHandle, PoolSet};

const TICK: Duration = Duration::from_secs(1);

async fn status_line(pool: &PoolHandle) -> String {
    let orchestrator = &pool.orchestrator;
    let eligibility = match orchestrator.eligibility().await {
        Eligibility::Eligible => "eligible".to_string(),
        Eligibility::Ineligible(countdown) => format!("next claim in {}", countdown.short()),
        Eligibility::Unknown => match orchestrator.wallet_state().active_account() {
            None => "unknown (wallet disconnected)".to_string(),
            Some(_) if orchestrator.wallet_state().chain_id != Some(pool.contract().chain_id) => {
                "unknown (wallet on another chain)".to_string()
            }
            Some(_) => "unknown (loading)".to_string(),
        },
    };
    format!(
        "{}: {} [{}]",
        pool.contract().name,
        eligibility,
        orchestrator.session().status
    )
}

pub async fn run(set: &PoolSet, pool: Option<&str>, auto: bool) -> anyhow::Result<()> {
    let pools = select_pools(set, pool)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = set.spawn_wallet_watches();
    if auto {
        tasks.extend(PoolSet::spawn_auto_triggers(&pools, shutdown_rx));
    } else if let Err(e) = set.connect().await {
        output::report(Tone::Notice, format_args!("Wallet not connected: {e}"));
    }

    for handle in &pools {
        let orchestrator = handle.orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            let mut finished_rx = orchestrator.subscribe_finished();
            let _ = finished_rx.borrow_and_update();
            while finished_rx.changed().await.is_ok() {
                let finished = finished_rx.borrow_and_update().clone();
                if let Some(session) = finished {
                    claim::report(orchestrator.contract(), &session);
                }
            }
        }));
    }

    info!(
        "Watching {} pool(s){}",
        pools.len(),
        if auto { " with auto-claim" } else { "" }
    );
    println!("Watching {} pool(s), Ctrl+C to stop", pools.len());

    let mut last_lines: HashMap<String, String> = HashMap::new();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for handle in &pools {
                    let line = status_line(handle).await;
                    let name = handle.contract().name.clone();
                    if last_lines.get(&name) != Some(&line) {
                        println!("{line}");
                        last_lines.insert(name, line);
                    }
                }
            }
            _ = &mut ctrl_c => {
                println!();
                info!("Received Ctrl+C, stopping watch");
                break;
            }
        }
    }

    shutdown_tx.send_replace(true);
    for task in tasks {
        task.abort();
    }
    Ok(())
}
