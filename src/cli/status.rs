//! `reward-claimer status`: eligibility per pool.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use super::output::{self, OutputMode, Tone};
use crate::services::{PoolHandle, PoolSet};

#[derive(Debug, Serialize, Tabled)]
pub struct PoolStatusRow {
    pub pool: String,
    pub chain: String,
    pub eligibility: String,
    pub next_claim: String,
    pub per_claim: String,
    pub pool_balance: String,
    pub last_claim: String,
    pub session: String,
}

/// Pools named by `--pool`, or all of them
pub fn select_pools<'a>(set: &'a PoolSet, pool: Option<&str>) -> anyhow::Result<Vec<&'a PoolHandle>> {
    match pool {
        Some(name) => Ok(vec![set.get(name)?]),
        None => Ok(set.pools().iter().collect()),
    }
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Read one pool for `account` and render it
pub async fn pool_row(pool: &PoolHandle, account: Option<Address>) -> PoolStatusRow {
    let contract = pool.contract();
    let orchestrator = &pool.orchestrator;

    let mut row = PoolStatusRow {
        pool: contract.name.clone(),
        chain: format!("{} ({})", contract.chain_name(), contract.chain_id),
        eligibility: "unknown".into(),
        next_claim: "-".into(),
        per_claim: contract.display_amount(contract.per_claim_amount),
        pool_balance: "-".into(),
        last_claim: "-".into(),
        session: orchestrator.session().status.to_string(),
    };

    let Some(account) = account else {
        row.eligibility = "unknown (wallet disconnected)".into();
        return row;
    };

    if let Err(e) = orchestrator.reader().refresh(account).await {
        row.eligibility = format!("unknown ({})", e);
    }

    if let Some(snapshot) = orchestrator.reader().snapshot(account).await {
        let window = snapshot.window(contract.cooldown_secs);
        row.eligibility = orchestrator.eligibility_for(account).await.to_string();
        row.per_claim = contract.display_amount(snapshot.per_claim_amount);
        if let Some(balance) = snapshot.pool_balance {
            row.pool_balance = contract.display_amount(balance);
            if snapshot.pool_can_cover() == Some(false) {
                row.pool_balance.push_str(" (low)");
            }
        }
        if window.has_claimed_before() {
            row.last_claim = format_timestamp(snapshot.last_claim_timestamp);
        } else {
            row.last_claim = "never".into();
        }
        if let Some(next) = window.next_eligible_timestamp() {
            row.next_claim = format_timestamp(next);
        }
    }

    row
}

pub async fn run(set: &PoolSet, pool: Option<&str>, mode: OutputMode) -> anyhow::Result<()> {
    let pools = select_pools(set, pool)?;

    if let Err(e) = set.connect().await {
        output::report(Tone::Notice, format_args!("Wallet not connected: {e}"));
    }
    let account = set.wallet().state().active_account();

    let mut rows = Vec::with_capacity(pools.len());
    for pool in pools {
        rows.push(pool_row(pool, account).await);
    }

    if mode == OutputMode::Table {
        match account {
            Some(account) => println!("Account: {account}"),
            None => println!("Account: (not connected)"),
        }
    }
    println!("{}", output::render_rows(&rows, mode)?);
    Ok(())
}
