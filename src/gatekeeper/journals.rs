//! Operator actions on single journals.
//!
//! Everything here that changes persisted state also appends an audit entry.
//! Journals are looked up by internal id or by external uuid.

use super::audit_trail::{AuditAction, AuditEntry};
use super::probe::{HealthProbe, ProbeError, ProbeResult};
use super::whitelist::{GateError, WhitelistGate};
use crate::journal::{Journal, JournalId, JournalStatus, ListEntry};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{AuditStore, JournalStore, Store, StoreError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Journal action errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("Journal not found: {0}")]
    NotFound(String),

    #[error("Journal {uuid} has {count} deposit(s) and cannot be deleted")]
    HasDeposits { uuid: String, count: usize },

    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of an on-demand probe that got an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReprobeOutcome {
    /// 200 with a ping document.
    Healthy {
        version: Option<String>,
        title: Option<String>,
    },
    /// Answered, but not with 200.
    Incomplete { status: u16, error: String },
}

/// Find a journal by internal id or external uuid.
pub async fn resolve_journal<S: JournalStore>(store: &S, key: &str) -> Result<Journal, JournalError> {
    if let Ok(id) = key.parse::<JournalId>() {
        if let Some(journal) = store.get_journal(id).await? {
            return Ok(journal);
        }
    }
    store
        .find_journal_by_uuid(key)
        .await?
        .ok_or_else(|| JournalError::NotFound(key.to_string()))
}

/// Register a journal. Fails with [`StoreError::Duplicate`] if the uuid is
/// already known.
pub async fn register_journal<S: JournalStore>(
    store: &S,
    uuid: &str,
    url: &str,
) -> Result<Journal, JournalError> {
    if let Some(existing) = store.find_journal_by_uuid(uuid).await? {
        return Err(StoreError::Duplicate(format!("journal uuid {}", existing.uuid())).into());
    }
    let journal = Journal::new(uuid, url);
    store.save_journal(&journal).await?;
    info!(uuid = %journal.uuid(), journal = %journal.url, "registered journal");
    Ok(journal)
}

/// Operator status change. Setting `healthy` also stamps `contacted`.
pub async fn update_status<S>(
    store: &S,
    key: &str,
    status: JournalStatus,
    now: OffsetDateTime,
) -> Result<Journal, JournalError>
where
    S: JournalStore + AuditStore,
{
    let mut journal = resolve_journal(store, key).await?;
    let previous = journal.status;

    journal.status = status;
    if status == JournalStatus::Healthy {
        journal.contacted = Some(now);
    }
    store.save_journal(&journal).await?;

    store
        .append_audit(&AuditEntry::new(
            journal.uuid(),
            AuditAction::StatusChanged,
            format!("{}: {} -> {}", journal.url, previous, status),
            now,
        ))
        .await?;
    info!(uuid = %journal.uuid(), from = %previous, to = %status, "journal status changed");
    Ok(journal)
}

/// Probe one journal now, retrying transient network failures, and record
/// the outcome on the journal.
pub async fn reprobe<S, P>(
    store: &S,
    probe: &P,
    key: &str,
    retry: RetryPolicy,
    now: OffsetDateTime,
) -> Result<ReprobeOutcome, JournalError>
where
    S: JournalStore + AuditStore,
    P: HealthProbe,
{
    let mut journal = resolve_journal(store, key).await?;

    let target = &journal;
    let result: Result<ProbeResult, ProbeError> =
        retry_with_backoff(retry, move || probe.probe(target), ProbeError::is_retryable).await;

    let (outcome, details) = match result {
        Ok(result) if result.is_http_ok() => {
            journal.mark_contacted(result.journal_title.clone(), now);
            let details = format!(
                "healthy, version {}",
                result.version.as_deref().unwrap_or("unknown")
            );
            let outcome = ReprobeOutcome::Healthy {
                version: result.version,
                title: result.journal_title,
            };
            (Ok(outcome), details)
        }
        Ok(result) => {
            journal.status = JournalStatus::PingError;
            let error = result.error.unwrap_or_default();
            let details = format!("HTTP {} {}", result.http_status, error);
            let outcome = ReprobeOutcome::Incomplete {
                status: result.http_status,
                error,
            };
            (Ok(outcome), details)
        }
        Err(err) => {
            warn!(uuid = %journal.uuid(), journal = %journal.url, error = %err, "re-probe failed");
            journal.status = match err {
                ProbeError::Network(_) => JournalStatus::Unreachable,
                ProbeError::Protocol(_) => JournalStatus::PingError,
            };
            let details = err.to_string();
            (Err(JournalError::Probe(err)), details)
        }
    };

    store.save_journal(&journal).await?;
    store
        .append_audit(&AuditEntry::new(
            journal.uuid(),
            AuditAction::Reprobed,
            format!("{}: {}", journal.url, details),
            now,
        ))
        .await?;

    outcome
}

/// Blacklist a journal by hand.
pub async fn blacklist_journal<S: Store>(
    store: &Arc<S>,
    key: &str,
    comment: &str,
    now: OffsetDateTime,
) -> Result<ListEntry, JournalError> {
    let journal = resolve_journal(store.as_ref(), key).await?;
    let gate = WhitelistGate::new(Arc::clone(store));
    let entry = gate.blacklist(journal.uuid(), comment, now).await?;

    store
        .append_audit(&AuditEntry::new(
            journal.uuid(),
            AuditAction::Blacklisted,
            format!("{}: {}", journal.url, comment),
            now,
        ))
        .await?;
    Ok(entry)
}

/// Take a journal off both admission lists. Returns the number of entries
/// removed.
pub async fn delist_journal<S: Store>(
    store: &Arc<S>,
    key: &str,
    now: OffsetDateTime,
) -> Result<usize, JournalError> {
    let journal = resolve_journal(store.as_ref(), key).await?;
    let gate = WhitelistGate::new(Arc::clone(store));
    let removed = gate.delist(journal.uuid()).await?;

    if removed > 0 {
        store
            .append_audit(&AuditEntry::new(
                journal.uuid(),
                AuditAction::Delisted,
                journal.url.clone(),
                now,
            ))
            .await?;
    }
    Ok(removed)
}

/// Delete a journal that has no deposits. The journal is also taken off both
/// admission lists.
pub async fn delete_journal<S: Store>(
    store: &Arc<S>,
    key: &str,
    now: OffsetDateTime,
) -> Result<Journal, JournalError> {
    let journal = resolve_journal(store.as_ref(), key).await?;

    let count = store.count_deposits(journal.id()).await?;
    if count > 0 {
        return Err(JournalError::HasDeposits {
            uuid: journal.uuid().to_string(),
            count,
        });
    }

    let gate = WhitelistGate::new(Arc::clone(store));
    gate.delist(journal.uuid()).await?;
    store.delete_journal(journal.id()).await?;

    store
        .append_audit(&AuditEntry::new(
            journal.uuid(),
            AuditAction::JournalDeleted,
            journal.url.clone(),
            now,
        ))
        .await?;
    info!(uuid = %journal.uuid(), journal = %journal.url, "deleted journal");
    Ok(journal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit::{Deposit, DepositAction, NewDeposit};
    use crate::gatekeeper::mock::MockProbe;
    use crate::journal::ListKind;
    use crate::store::{DepositStore, ListStore, MemoryStore};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-07-04 12:00 UTC);

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        }
    }

    async fn store_with(uuid: &str) -> (Arc<MemoryStore>, Journal) {
        let store = Arc::new(MemoryStore::new());
        let journal = register_journal(store.as_ref(), uuid, "http://j.example.org")
            .await
            .unwrap();
        (store, journal)
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_uuid() {
        let (store, journal) = store_with("abc").await;
        assert_eq!(
            resolve_journal(store.as_ref(), &journal.id().to_string())
                .await
                .unwrap(),
            journal
        );
        assert_eq!(resolve_journal(store.as_ref(), "ABC").await.unwrap(), journal);
        assert!(matches!(
            resolve_journal(store.as_ref(), "missing").await,
            Err(JournalError::NotFound(_))
        ));
        assert!(matches!(
            register_journal(store.as_ref(), "abc", "http://other.example.org").await,
            Err(JournalError::Store(StoreError::Duplicate(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_status_healthy_stamps_contacted() {
        let (store, _journal) = store_with("abc").await;

        let journal = update_status(store.as_ref(), "abc", JournalStatus::Down, NOW)
            .await
            .unwrap();
        assert_eq!(journal.status, JournalStatus::Down);
        assert_eq!(journal.contacted, None);

        let journal = update_status(store.as_ref(), "abc", JournalStatus::Healthy, NOW)
            .await
            .unwrap();
        assert_eq!(journal.contacted, Some(NOW));

        let audit = store.audit_entries().await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].details, "http://j.example.org: down -> healthy");
    }

    #[tokio::test]
    async fn test_reprobe_records_outcome() {
        let (store, journal) = store_with("abc").await;
        let probe = MockProbe::new();

        probe.healthy("abc", Some("3.3.0.7"), Some("Quokka Quarterly"));
        let outcome = reprobe(store.as_ref(), &probe, "abc", no_wait(), NOW)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReprobeOutcome::Healthy {
                version: Some("3.3.0.7".to_string()),
                title: Some("Quokka Quarterly".to_string())
            }
        );
        let stored = store.get_journal(journal.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, JournalStatus::Healthy);
        assert_eq!(stored.title.as_deref(), Some("Quokka Quarterly"));

        probe.fail("abc", ProbeError::Network("timed out".to_string()));
        let err = reprobe(store.as_ref(), &probe, "abc", no_wait(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Probe(ProbeError::Network(_))));
        // One attempt for the first call, three for the retried failure.
        assert_eq!(probe.calls().len(), 4);

        let stored = store.get_journal(journal.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, JournalStatus::Unreachable);
        assert_eq!(store.audit_entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_refused_with_deposits() {
        let (store, journal) = store_with("abc").await;
        let deposit = Deposit::receive(
            NewDeposit {
                journal: journal.id(),
                deposit_uuid: "d-1".to_string(),
                file_type: "zip".to_string(),
                action: DepositAction::Add,
                volume: 1,
                issue: 1,
                pub_date: None,
                checksum_type: None,
                checksum_value: None,
                url: None,
                size: None,
                license: BTreeMap::new(),
            },
            NOW,
        );
        store.insert_deposit(&deposit).await.unwrap();

        let err = delete_journal(&store, "abc", NOW).await.unwrap_err();
        assert_eq!(
            err,
            JournalError::HasDeposits {
                uuid: "ABC".to_string(),
                count: 1
            }
        );
        assert!(store.get_journal(journal.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_delists() {
        let (store, journal) = store_with("abc").await;
        blacklist_journal(&store, "abc", "spam", NOW).await.unwrap();

        delete_journal(&store, "abc", NOW).await.unwrap();
        assert!(store.get_journal(journal.id()).await.unwrap().is_none());
        assert!(store
            .list_entry(ListKind::Blacklist, "ABC")
            .await
            .unwrap()
            .is_none());

        let actions: Vec<AuditAction> = store
            .audit_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::Blacklisted, AuditAction::JournalDeleted]);
    }

    #[tokio::test]
    async fn test_blacklist_and_delist() {
        let (store, _journal) = store_with("abc").await;
        blacklist_journal(&store, "abc", "spam", NOW).await.unwrap();

        assert!(matches!(
            blacklist_journal(&store, "abc", "again", NOW).await,
            Err(JournalError::Gate(GateError::AlreadyListed { .. }))
        ));

        assert_eq!(delist_journal(&store, "abc", NOW).await.unwrap(), 1);
        assert_eq!(delist_journal(&store, "abc", NOW).await.unwrap(), 0);
    }
}
