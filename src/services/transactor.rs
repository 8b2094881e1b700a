//! Claim transactor
//!
//! The only path that sends `claim()` to a contract. Keeps a registry of
//! in-flight (chain, contract, account) keys so a second submission for the
//! same key is refused while the first is unresolved, then follows the
//! transaction to its receipt on a background task.

use alloy::primitives::TxHash;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::ContractCaller;
use crate::domain::{ClaimReceipt, RewardContractRef, SessionKey};
use crate::error::ClaimFailure;

/// Why a submission did not produce a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Claim already in flight for {key} (session {session_id})")]
    AlreadyInFlight { key: SessionKey, session_id: Uuid },

    #[error(transparent)]
    Failed(#[from] ClaimFailure),
}

/// Progress of a sent transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLifecycle {
    Confirming(TxHash),
    Confirmed(ClaimReceipt),
    Failed(ClaimFailure),
}

/// Handle to one sent claim transaction
#[derive(Debug)]
pub struct TransactionHandle {
    pub tx_hash: TxHash,
    pub key: SessionKey,
    updates: watch::Receiver<TxLifecycle>,
}

impl TransactionHandle {
    /// Wait for the receipt
    pub async fn outcome(&mut self) -> Result<ClaimReceipt, ClaimFailure> {
        loop {
            let current = self.updates.borrow_and_update().clone();
            match current {
                TxLifecycle::Confirmed(receipt) => return Ok(receipt),
                TxLifecycle::Failed(failure) => return Err(failure),
                TxLifecycle::Confirming(_) => {}
            }
            if self.updates.changed().await.is_err() {
                return Err(ClaimFailure::NetworkFailure(format!(
                    "confirmation watcher for {} stopped",
                    self.tx_hash
                )));
            }
        }
    }
}

/// Sends claims and tracks them until they resolve
#[derive(Clone)]
pub struct ClaimTransactor {
    caller: Arc<dyn ContractCaller>,
    in_flight: Arc<DashMap<SessionKey, Uuid>>,
}

impl ClaimTransactor {
    pub fn new(caller: Arc<dyn ContractCaller>) -> Self {
        Self {
            caller,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Session currently holding `key`
    pub fn in_flight(&self, key: &SessionKey) -> Option<Uuid> {
        self.in_flight.get(key).map(|entry| *entry.value())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Send one claim for `key`.
    ///
    /// Resolves once the wallet accepted the transaction; the receipt is
    /// followed through the returned handle.
    #[instrument(skip(self, contract), fields(pool = %contract.name, key = %key))]
    pub async fn submit(
        &self,
        session_id: Uuid,
        key: SessionKey,
        contract: &RewardContractRef,
    ) -> Result<TransactionHandle, SubmitError> {
        match self.in_flight.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                warn!("Refusing duplicate claim, {} already holds {}", existing.get(), key);
                return Err(SubmitError::AlreadyInFlight {
                    key,
                    session_id: *existing.get(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session_id);
            }
        }

        let tx_hash = match self.caller.send_claim(contract, key.account).await {
            Ok(hash) => hash,
            Err(failure) => {
                self.in_flight.remove(&key);
                debug!("Claim not sent: {}", failure);
                return Err(failure.into());
            }
        };
        info!("Claim transaction sent: {}", tx_hash);

        let (updates_tx, updates_rx) = watch::channel(TxLifecycle::Confirming(tx_hash));
        let caller = self.caller.clone();
        let in_flight = self.in_flight.clone();
        let contract = contract.clone();

        tokio::spawn(async move {
            let result = caller.wait_for_confirmation(&contract, tx_hash).await;
            in_flight.remove(&key);
            match result {
                Ok(receipt) => {
                    info!(
                        "Claim {} confirmed in block {:?}",
                        tx_hash, receipt.block_number
                    );
                    updates_tx.send_replace(TxLifecycle::Confirmed(receipt));
                }
                Err(failure) => {
                    warn!("Claim {} failed: {}", tx_hash, failure);
                    updates_tx.send_replace(TxLifecycle::Failed(failure));
                }
            }
        });

        Ok(TransactionHandle {
            tx_hash,
            key,
            updates: updates_rx,
        })
    }
}
