//! Whitelist / blacklist gate.
//!
//! Admission lists are keyed by the journal's external uuid. A uuid is on at
//! most one list at a time.
//!
//! Promotion is check-then-insert. The check is a fast path only: the insert
//! itself is a compare-and-swap in the store (`insert_if_unlisted`) that
//! refuses when the uuid landed on either list in the meantime, so a lost
//! race surfaces as [`GateError::AlreadyListed`] instead of a dual listing.
//! Overlapping sweeps should still be serialized by the caller.

use crate::journal::{canonical_uuid, ListEntry, ListKind};
use crate::store::{ListStore, StoreError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

/// Gate errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Journal {uuid} is already on the {list}")]
    AlreadyListed { uuid: String, list: ListKind },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Membership queries and promotions over the admission lists.
pub struct WhitelistGate<S: ListStore> {
    store: Arc<S>,
}

impl<S: ListStore> Clone for WhitelistGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ListStore> WhitelistGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn is_whitelisted(&self, uuid: &str) -> Result<bool, StoreError> {
        self.is_on(ListKind::Whitelist, uuid).await
    }

    pub async fn is_blacklisted(&self, uuid: &str) -> Result<bool, StoreError> {
        self.is_on(ListKind::Blacklist, uuid).await
    }

    /// Which list, if any, currently holds the uuid.
    pub async fn listing(&self, uuid: &str) -> Result<Option<ListKind>, StoreError> {
        if self.is_whitelisted(uuid).await? {
            return Ok(Some(ListKind::Whitelist));
        }
        if self.is_blacklisted(uuid).await? {
            return Ok(Some(ListKind::Blacklist));
        }
        Ok(None)
    }

    /// Add the uuid to the whitelist.
    pub async fn promote(
        &self,
        uuid: &str,
        comment: &str,
        now: OffsetDateTime,
    ) -> Result<ListEntry, GateError> {
        self.insert(ListKind::Whitelist, uuid, comment, now).await
    }

    /// Add the uuid to the blacklist.
    pub async fn blacklist(
        &self,
        uuid: &str,
        comment: &str,
        now: OffsetDateTime,
    ) -> Result<ListEntry, GateError> {
        self.insert(ListKind::Blacklist, uuid, comment, now).await
    }

    /// Remove the uuid from both lists.
    pub async fn delist(&self, uuid: &str) -> Result<usize, StoreError> {
        let removed = self.store.remove_listing(&canonical_uuid(uuid)).await?;
        if removed > 0 {
            info!(uuid = %canonical_uuid(uuid), removed, "delisted journal");
        }
        Ok(removed)
    }

    pub async fn entries(&self, kind: ListKind) -> Result<Vec<ListEntry>, StoreError> {
        self.store.list_entries(kind).await
    }

    async fn is_on(&self, kind: ListKind, uuid: &str) -> Result<bool, StoreError> {
        Ok(self
            .store
            .list_entry(kind, &canonical_uuid(uuid))
            .await?
            .is_some())
    }

    async fn insert(
        &self,
        kind: ListKind,
        uuid: &str,
        comment: &str,
        now: OffsetDateTime,
    ) -> Result<ListEntry, GateError> {
        let uuid = canonical_uuid(uuid);

        if let Some(list) = self.listing(&uuid).await? {
            return Err(GateError::AlreadyListed { uuid, list });
        }

        let entry = ListEntry::new(&uuid, comment, now);
        if !self.store.insert_if_unlisted(kind, &entry).await? {
            // Lost the race between the check and the insert.
            let list = self.listing(&uuid).await?.unwrap_or(kind);
            return Err(GateError::AlreadyListed { uuid, list });
        }

        info!(uuid = %entry.uuid, list = %kind, "added journal to admission list");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-02-14 08:00 UTC);

    fn gate() -> (Arc<MemoryStore>, WhitelistGate<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), WhitelistGate::new(store))
    }

    #[tokio::test]
    async fn test_promote_and_query() {
        let (_store, gate) = gate();

        let entry = gate.promote("abc-1", "manual", NOW).await.unwrap();
        assert_eq!(entry.uuid, "ABC-1");
        assert_eq!(entry.created, NOW);

        assert!(gate.is_whitelisted("abc-1").await.unwrap());
        assert!(gate.is_whitelisted("ABC-1").await.unwrap());
        assert!(!gate.is_blacklisted("abc-1").await.unwrap());
        assert_eq!(gate.listing("abc-1").await.unwrap(), Some(ListKind::Whitelist));
    }

    #[tokio::test]
    async fn test_promote_twice_is_already_listed() {
        let (_store, gate) = gate();
        gate.promote("abc-1", "first", NOW).await.unwrap();

        let err = gate.promote("abc-1", "second", NOW).await.unwrap_err();
        assert_eq!(
            err,
            GateError::AlreadyListed {
                uuid: "ABC-1".to_string(),
                list: ListKind::Whitelist
            }
        );
        assert_eq!(gate.entries(ListKind::Whitelist).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blacklisted_cannot_be_promoted() {
        let (_store, gate) = gate();
        gate.blacklist("abc-1", "spam", NOW).await.unwrap();

        let err = gate.promote("abc-1", "auto", NOW).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::AlreadyListed {
                list: ListKind::Blacklist,
                ..
            }
        ));
        assert!(!gate.is_whitelisted("abc-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_refusal_maps_to_already_listed() {
        let (store, gate) = gate();
        // Another writer lists the uuid directly, behind the gate's back.
        let sneaky = ListEntry::new("abc-1", "other writer", NOW);
        assert!(store
            .insert_if_unlisted(ListKind::Blacklist, &sneaky)
            .await
            .unwrap());

        let err = gate.promote("abc-1", "auto", NOW).await.unwrap_err();
        assert!(matches!(err, GateError::AlreadyListed { .. }));
        assert!(!gate.is_whitelisted("abc-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_promotions_list_once() {
        let (_store, gate) = gate();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        gate.promote("race-1", "w", NOW).await
                    } else {
                        gate.blacklist("race-1", "b", NOW).await
                    }
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        let white = gate.is_whitelisted("race-1").await.unwrap();
        let black = gate.is_blacklisted("race-1").await.unwrap();
        assert!(white ^ black);
    }

    #[tokio::test]
    async fn test_delist() {
        let (_store, gate) = gate();
        gate.promote("abc-1", "w", NOW).await.unwrap();

        assert_eq!(gate.delist("abc-1").await.unwrap(), 1);
        assert_eq!(gate.delist("abc-1").await.unwrap(), 0);
        assert_eq!(gate.listing("abc-1").await.unwrap(), None);

        // Delisted journals can be listed again.
        gate.blacklist("abc-1", "b", NOW).await.unwrap();
    }
}
