//! In-memory store for tests and dry runs.
//!
//! One mutex guards the whole state, so every trait call is atomic. The guard
//! is never held across an await point.

use super::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory [`Store`] implementation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    journals: Vec<Journal>,
    whitelist: HashMap<String, ListEntry>,
    blacklist: HashMap<String, ListEntry>,
    list_order: Vec<(ListKind, String)>,
    deposits: Vec<Deposit>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn list(&self, kind: ListKind) -> &HashMap<String, ListEntry> {
        match kind {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut HashMap<String, ListEntry> {
        match kind {
            ListKind::Whitelist => &mut self.whitelist,
            ListKind::Blacklist => &mut self.blacklist,
        }
    }

    fn deposits_where(&self, pred: impl Fn(&Deposit) -> bool) -> Vec<Deposit> {
        self.deposits.iter().filter(|d| pred(d)).cloned().collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl JournalStore for MemoryStore {
    async fn list_journals(&self) -> StoreResult<Vec<Journal>> {
        Ok(self.lock()?.journals.clone())
    }

    async fn get_journal(&self, id: JournalId) -> StoreResult<Option<Journal>> {
        Ok(self.lock()?.journals.iter().find(|j| j.id() == id).cloned())
    }

    async fn find_journal_by_uuid(&self, uuid: &str) -> StoreResult<Option<Journal>> {
        let uuid = crate::journal::canonical_uuid(uuid);
        Ok(self
            .lock()?
            .journals
            .iter()
            .find(|j| j.uuid() == uuid)
            .cloned())
    }

    async fn save_journal(&self, journal: &Journal) -> StoreResult<()> {
        let mut state = self.lock()?;

        if state
            .journals
            .iter()
            .any(|j| j.uuid() == journal.uuid() && j.id() != journal.id())
        {
            return Err(StoreError::Duplicate(format!("journal uuid {}", journal.uuid())));
        }

        match state.journals.iter_mut().find(|j| j.id() == journal.id()) {
            Some(existing) => *existing = journal.clone(),
            None => state.journals.push(journal.clone()),
        }
        Ok(())
    }

    async fn delete_journal(&self, id: JournalId) -> StoreResult<()> {
        let mut state = self.lock()?;
        let before = state.journals.len();
        state.journals.retain(|j| j.id() != id);
        if state.journals.len() == before {
            return Err(StoreError::NotFound(format!("journal {}", id)));
        }
        Ok(())
    }

    async fn search_journals(&self, query: &str) -> StoreResult<Vec<Journal>> {
        Ok(self
            .lock()?
            .journals
            .iter()
            .filter(|j| j.matches(query))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn list_entry(&self, kind: ListKind, uuid: &str) -> StoreResult<Option<ListEntry>> {
        Ok(self.lock()?.list(kind).get(uuid).cloned())
    }

    async fn insert_if_unlisted(&self, kind: ListKind, entry: &ListEntry) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.whitelist.contains_key(&entry.uuid) || state.blacklist.contains_key(&entry.uuid) {
            return Ok(false);
        }
        state.list_mut(kind).insert(entry.uuid.clone(), entry.clone());
        state.list_order.push((kind, entry.uuid.clone()));
        Ok(true)
    }

    async fn remove_listing(&self, uuid: &str) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let removed = usize::from(state.whitelist.remove(uuid).is_some())
            + usize::from(state.blacklist.remove(uuid).is_some());
        state.list_order.retain(|(_, listed)| listed != uuid);
        Ok(removed)
    }

    async fn list_entries(&self, kind: ListKind) -> StoreResult<Vec<ListEntry>> {
        let state = self.lock()?;
        let list = state.list(kind);
        Ok(state
            .list_order
            .iter()
            .filter(|(k, _)| *k == kind)
            .filter_map(|(_, uuid)| list.get(uuid).cloned())
            .collect())
    }
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn insert_deposit(&self, deposit: &Deposit) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state
            .deposits
            .iter()
            .any(|d| d.id() == deposit.id() || d.deposit_uuid() == deposit.deposit_uuid())
        {
            return Err(StoreError::Duplicate(format!("deposit {}", deposit.deposit_uuid())));
        }
        state.deposits.push(deposit.clone());
        Ok(())
    }

    async fn update_deposit(&self, deposit: &mut Deposit) -> StoreResult<()> {
        let mut state = self.lock()?;
        let stored = state
            .deposits
            .iter_mut()
            .find(|d| d.id() == deposit.id())
            .ok_or_else(|| StoreError::NotFound(format!("deposit {}", deposit.id())))?;

        if stored.revision() != deposit.revision() {
            return Err(StoreError::Conflict(format!(
                "deposit {} is at revision {}, update was based on {}",
                deposit.id(),
                stored.revision(),
                deposit.revision()
            )));
        }

        deposit.set_revision(deposit.revision() + 1);
        *stored = deposit.clone();
        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> StoreResult<Option<Deposit>> {
        Ok(self.lock()?.deposits.iter().find(|d| d.id() == id).cloned())
    }

    async fn find_deposit_by_uuid(&self, deposit_uuid: &str) -> StoreResult<Option<Deposit>> {
        let deposit_uuid = deposit_uuid.trim().to_ascii_uppercase();
        Ok(self
            .lock()?
            .deposits
            .iter()
            .find(|d| d.deposit_uuid() == deposit_uuid)
            .cloned())
    }

    async fn deposits_for_journal(&self, journal: JournalId) -> StoreResult<Vec<Deposit>> {
        Ok(self.lock()?.deposits_where(|d| d.journal() == journal))
    }

    async fn deposits_in_state(&self, state: DepositState) -> StoreResult<Vec<Deposit>> {
        Ok(self.lock()?.deposits_where(|d| d.state() == state))
    }

    async fn deposits_with_errors(&self) -> StoreResult<Vec<Deposit>> {
        Ok(self.lock()?.deposits_where(|d| d.error_count() > 0))
    }

    async fn search_deposits(&self, query: &str) -> StoreResult<Vec<Deposit>> {
        Ok(self.lock()?.deposits_where(|d| d.matches(query)))
    }

    async fn count_deposits(&self, journal: JournalId) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .deposits
            .iter()
            .filter(|d| d.journal() == journal)
            .count())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.lock()?.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.lock()?.audit.clone())
    }
}
