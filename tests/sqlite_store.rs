// Integration tests for the SQLite store
//
// These tests verify:
// - Journals, list entries and the audit trail survive reopening the file
// - The admission-list CAS holds across separate connections
// - Journal uuids stay unique

use pln_staging::gatekeeper::{AuditAction, AuditEntry};
use pln_staging::journal::{Journal, JournalStatus, ListEntry, ListKind};
use pln_staging::store::{AuditStore, JournalStore, ListStore, SqliteStore, StoreError};
use std::path::Path;
use tempfile::TempDir;
use time::macros::datetime;
use time::OffsetDateTime;

const NOW: OffsetDateTime = datetime!(2026-07-04 18:00 UTC);

async fn open(dir: &Path) -> SqliteStore {
    SqliteStore::open(&dir.join("staging.db")).await.unwrap()
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let mut journal = Journal::new("keep-1", "http://keep.example.org");
    {
        let store = open(dir.path()).await;
        journal.mark_contacted(Some("Kept Journal".to_string()), NOW);
        store.save_journal(&journal).await.unwrap();
        assert!(store
            .insert_if_unlisted(ListKind::Whitelist, &ListEntry::new("keep-1", "manual", NOW))
            .await
            .unwrap());
        store
            .append_audit(&AuditEntry::new("KEEP-1", AuditAction::Promoted, "manual", NOW))
            .await
            .unwrap();
    }

    let store = open(dir.path()).await;
    let loaded = store.find_journal_by_uuid("KEEP-1").await.unwrap().unwrap();
    assert_eq!(loaded, journal);
    assert_eq!(loaded.status, JournalStatus::Healthy);

    let entry = store
        .list_entry(ListKind::Whitelist, "KEEP-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.comment, "manual");
    assert_eq!(entry.created, NOW);

    let audit = store.audit_entries().await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Promoted);
}

#[tokio::test]
async fn test_list_cas_across_connections() {
    let dir = TempDir::new().unwrap();
    let first = open(dir.path()).await;
    let second = open(dir.path()).await;

    assert!(first
        .insert_if_unlisted(ListKind::Blacklist, &ListEntry::new("race-1", "a", NOW))
        .await
        .unwrap());
    assert!(!second
        .insert_if_unlisted(ListKind::Whitelist, &ListEntry::new("race-1", "b", NOW))
        .await
        .unwrap());

    assert!(second
        .list_entries(ListKind::Whitelist)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(second.remove_listing("RACE-1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_journal_uuid_is_unique() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    store
        .save_journal(&Journal::new("dup-1", "http://a.example.org"))
        .await
        .unwrap();
    let result = store
        .save_journal(&Journal::new("DUP-1", "http://b.example.org"))
        .await;

    assert!(matches!(result, Err(StoreError::Duplicate(_))));
    assert_eq!(store.list_journals().await.unwrap().len(), 1);
}
