//! `reward-claimer claim`: run one claim session per pool.

use anyhow::bail;

use super::output::{self, Tone};
use super::status::select_pools;
use crate::domain::{ClaimSession, ClaimStatus, Eligibility, RewardContractRef};
use crate::services::PoolSet;

/// Print a finished session; true when the claim landed
pub fn report(contract: &RewardContractRef, session: &ClaimSession) -> bool {
    match session.status {
        ClaimStatus::Confirmed => {
            let amount = session
                .receipt
                .as_ref()
                .and_then(|r| r.claimed_amount)
                .unwrap_or(contract.per_claim_amount);
            let tx = session
                .tx_hash
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".into());
            output::report(
                Tone::Done,
                format_args!(
                    "✓ {}: claimed {} (tx {})",
                    contract.name,
                    contract.display_amount(amount),
                    tx
                ),
            );
            true
        }
        ClaimStatus::Failed => {
            match session.visible_error() {
                Some(error) => {
                    output::report(Tone::Problem, format_args!("✗ {}: {}", contract.name, error))
                }
                None => output::report(
                    Tone::Notice,
                    format_args!("{}: rejected in wallet", contract.name),
                ),
            }
            false
        }
        other => {
            output::report(
                Tone::Notice,
                format_args!("{}: claim abandoned while {}", contract.name, other),
            );
            false
        }
    }
}

pub async fn run(set: &PoolSet, pool: Option<&str>) -> anyhow::Result<()> {
    let pools = select_pools(set, pool)?;
    set.connect().await?;
    let account = set.wallet().state().active_account();

    let mut failures = 0usize;
    for handle in pools {
        let contract = handle.contract();

        // Without --pool, skip pools whose window is known to be closed
        if let (None, Some(account)) = (pool, account) {
            if let Err(e) = handle.orchestrator.reader().refresh(account).await {
                output::report(
                    Tone::Notice,
                    format_args!("{}: could not read claim window ({e})", contract.name),
                );
            }
            if let Eligibility::Ineligible(countdown) =
                handle.orchestrator.eligibility_for(account).await
            {
                println!("{}: next claim in {}", contract.name, countdown);
                continue;
            }
        }

        println!("Claiming from {} ...", contract);
        let finished = handle.orchestrator.claim_and_wait().await;
        if !report(contract, &finished) && finished.visible_error().is_some() {
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} claim(s) failed");
    }
    Ok(())
}
