//! Durable store seam.
//!
//! The staging core never talks to a database directly. Everything goes
//! through these traits, so the trust sweep and the deposit ledger run the
//! same way against [`MemoryStore`] (tests, dry runs) and [`SqliteStore`].
//!
//! Contract every implementation keeps:
//! - each call persists at most one record, atomically
//! - `insert_if_unlisted` is a compare-and-swap across BOTH admission lists
//! - `update_deposit` is an optimistic write: it fails with
//!   [`StoreError::Conflict`] when the stored revision moved on, and bumps the
//!   revision on success
//! - listing calls return records in insertion order

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::deposit::{Deposit, DepositId, DepositState};
use crate::gatekeeper::audit_trail::AuditEntry;
use crate::journal::{Journal, JournalId, ListEntry, ListKind};
use async_trait::async_trait;

/// Store errors. These are the only failures that abort a sweep.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait JournalStore: Send + Sync {
    /// All journals, in registration order.
    async fn list_journals(&self) -> StoreResult<Vec<Journal>>;

    async fn get_journal(&self, id: JournalId) -> StoreResult<Option<Journal>>;

    /// Lookup by external identifier (canonical upper case).
    async fn find_journal_by_uuid(&self, uuid: &str) -> StoreResult<Option<Journal>>;

    /// Insert or replace. Fails with [`StoreError::Duplicate`] if another
    /// journal already holds the same uuid.
    async fn save_journal(&self, journal: &Journal) -> StoreResult<()>;

    async fn delete_journal(&self, id: JournalId) -> StoreResult<()>;

    /// Case-insensitive substring search over uuid, url and title.
    async fn search_journals(&self, query: &str) -> StoreResult<Vec<Journal>>;
}

#[async_trait]
pub trait ListStore: Send + Sync {
    async fn list_entry(&self, kind: ListKind, uuid: &str) -> StoreResult<Option<ListEntry>>;

    /// Insert `entry` into `kind` only if its uuid is on neither list.
    /// Returns `false` (and writes nothing) otherwise.
    async fn insert_if_unlisted(&self, kind: ListKind, entry: &ListEntry) -> StoreResult<bool>;

    /// Remove the uuid from both lists. Returns the number of entries removed.
    async fn remove_listing(&self, uuid: &str) -> StoreResult<usize>;

    async fn list_entries(&self, kind: ListKind) -> StoreResult<Vec<ListEntry>>;
}

#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Insert a new deposit. Fails with [`StoreError::Duplicate`] if the id
    /// or the deposit uuid already exists.
    async fn insert_deposit(&self, deposit: &Deposit) -> StoreResult<()>;

    /// Optimistic update: succeeds only if the stored revision equals
    /// `deposit.revision()`, then bumps the revision on both sides.
    async fn update_deposit(&self, deposit: &mut Deposit) -> StoreResult<()>;

    async fn get_deposit(&self, id: DepositId) -> StoreResult<Option<Deposit>>;

    async fn find_deposit_by_uuid(&self, deposit_uuid: &str) -> StoreResult<Option<Deposit>>;

    async fn deposits_for_journal(&self, journal: JournalId) -> StoreResult<Vec<Deposit>>;

    async fn deposits_in_state(&self, state: DepositState) -> StoreResult<Vec<Deposit>>;

    /// Deposits whose error log is not empty.
    async fn deposits_with_errors(&self) -> StoreResult<Vec<Deposit>>;

    /// Case-insensitive substring search over deposit uuid, url, checksum,
    /// downstream status and file type.
    async fn search_deposits(&self, query: &str) -> StoreResult<Vec<Deposit>>;

    async fn count_deposits(&self, journal: JournalId) -> StoreResult<usize>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// All entries, oldest first.
    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>>;
}

/// Everything the staging core needs from a backing store.
pub trait Store: JournalStore + ListStore + DepositStore + AuditStore {}

impl<T> Store for T where T: JournalStore + ListStore + DepositStore + AuditStore {}
