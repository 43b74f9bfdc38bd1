//! Deposit ledger: state machine transitions applied against the store.
//!
//! Every call loads the deposit, runs one transition and persists the result
//! with a single optimistic write. Failed guards are persisted too, since
//! they append to the logs and halt the deposit. A concurrent writer on the
//! same deposit surfaces as [`StoreError::Conflict`] and nothing is written.

use super::checksum::{ChecksumAlgorithm, ChecksumError, ChecksumPolicy};
use super::machine::DepositError;
use super::model::{Deposit, DepositId, DepositState, NewDeposit};
use crate::store::{DepositStore, JournalStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Ledger errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Deposit not found: {0}")]
    NotFound(String),

    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    #[error("Deposit {0} already exists")]
    DuplicateDeposit(String),

    #[error("Transition failed: {0}")]
    Transition(#[from] DepositError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Persists deposit transitions.
pub struct DepositLedger<S> {
    store: Arc<S>,
    policy: ChecksumPolicy,
    staging_dir: PathBuf,
}

impl<S> DepositLedger<S>
where
    S: DepositStore + JournalStore,
{
    pub fn new(store: Arc<S>, policy: ChecksumPolicy, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            policy,
            staging_dir: staging_dir.into(),
        }
    }

    /// Register an incoming deposit in `received`.
    pub async fn receive(&self, new: NewDeposit, now: OffsetDateTime) -> LedgerResult<Deposit> {
        if self.store.get_journal(new.journal).await?.is_none() {
            return Err(LedgerError::JournalNotFound(new.journal.to_string()));
        }
        if let Some(existing) = self.store.find_deposit_by_uuid(&new.deposit_uuid).await? {
            return Err(LedgerError::DuplicateDeposit(existing.deposit_uuid().to_string()));
        }

        // The lookup above is a fast path; the store's uniqueness check
        // settles concurrent intakes of the same uuid.
        let deposit = Deposit::receive(new, now);
        match self.store.insert_deposit(&deposit).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(LedgerError::DuplicateDeposit(
                    deposit.deposit_uuid().to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        }
        info!(deposit = %deposit, journal = %deposit.journal(), "deposit received");
        Ok(deposit)
    }

    /// Load by internal id or by deposit uuid.
    pub async fn resolve(&self, key: &str) -> LedgerResult<Deposit> {
        if let Ok(id) = key.parse::<DepositId>() {
            if let Some(deposit) = self.store.get_deposit(id).await? {
                return Ok(deposit);
            }
        }
        self.store
            .find_deposit_by_uuid(key)
            .await?
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))
    }

    /// `received -> validated`. A harvested payload, when given, is hashed
    /// off the async runtime.
    pub async fn validate(
        &self,
        id: DepositId,
        payload: Option<PathBuf>,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        let deposit = self.load(id).await?;
        let policy = self.policy.clone();

        let (deposit, before, outcome) = tokio::task::spawn_blocking(move || {
            let mut deposit = deposit;
            let before = deposit.clone();
            let outcome = deposit.validate(&policy, payload.as_deref(), now);
            (deposit, before, outcome)
        })
        .await
        .map_err(|e| StoreError::Database(format!("validation task failed: {}", e)))?;

        self.commit(deposit, &before, outcome).await
    }

    /// `validated -> packaged`.
    pub async fn package(&self, id: DepositId, now: OffsetDateTime) -> LedgerResult<Deposit> {
        let staging_dir = self.staging_dir.clone();
        self.apply(id, move |d| d.package(&staging_dir, now).map(|_| ()))
            .await
    }

    /// Record an externally computed package checksum and size.
    pub async fn record_package_checksum(
        &self,
        id: DepositId,
        checksum_type: &str,
        checksum_value: &str,
        size: u64,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        let policy = self.policy.clone();
        self.apply(id, move |d| {
            d.record_package_checksum(&policy, checksum_type, checksum_value, size, now)
        })
        .await
    }

    /// Digest the built package with `algorithm` and record the result.
    /// An unreadable package halts the deposit.
    pub async fn seal_package(
        &self,
        id: DepositId,
        algorithm: ChecksumAlgorithm,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        let mut deposit = self.load(id).await?;
        let before = deposit.clone();

        let digest = match deposit.package_info().path.clone() {
            Some(path) => {
                let policy = self.policy.clone();
                tokio::task::spawn_blocking(move || policy.digest_file(algorithm, &path))
                    .await
                    .map_err(|e| StoreError::Database(format!("digest task failed: {}", e)))?
            }
            None => Err(ChecksumError::Io("package has not been built".to_string())),
        };

        let outcome = match digest {
            Ok((value, size)) => {
                deposit.record_package_checksum(&self.policy, algorithm.label(), &value, size, now)
            }
            Err(err) => Err(deposit.package_unreadable(err, now)),
        };

        self.commit(deposit, &before, outcome).await
    }

    /// `packaged -> transferred`.
    pub async fn transfer(
        &self,
        id: DepositId,
        receipt: Option<String>,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        self.apply(id, move |d| d.transfer(receipt, now)).await
    }

    /// Apply a status reported by the preservation network.
    pub async fn apply_downstream_status(
        &self,
        id: DepositId,
        status: &str,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        self.apply(id, move |d| d.apply_downstream_status(status, now).map(|_| ()))
            .await
    }

    /// Operator retry back to `target`.
    pub async fn retry(
        &self,
        id: DepositId,
        target: DepositState,
        note: &str,
        now: OffsetDateTime,
    ) -> LedgerResult<Deposit> {
        self.apply(id, move |d| d.retry(target, note, now)).await
    }

    async fn load(&self, id: DepositId) -> LedgerResult<Deposit> {
        self.store
            .get_deposit(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn apply<F>(&self, id: DepositId, transition: F) -> LedgerResult<Deposit>
    where
        F: FnOnce(&mut Deposit) -> Result<(), DepositError>,
    {
        let mut deposit = self.load(id).await?;
        let before = deposit.clone();
        let outcome = transition(&mut deposit);
        self.commit(deposit, &before, outcome).await
    }

    /// Persist whatever the transition changed, then report its outcome.
    async fn commit(
        &self,
        mut deposit: Deposit,
        before: &Deposit,
        outcome: Result<(), DepositError>,
    ) -> LedgerResult<Deposit> {
        if deposit != *before {
            self.store.update_deposit(&mut deposit).await?;
        }

        match outcome {
            Ok(()) => {
                info!(deposit = %deposit, state = %deposit.state(), "deposit transition applied");
                Ok(deposit)
            }
            Err(err) => {
                warn!(
                    deposit = %deposit,
                    state = %deposit.state(),
                    halted = deposit.is_halted(),
                    error = %err,
                    "deposit transition rejected"
                );
                Err(err.into())
            }
        }
    }
}
