//! Policy index: canonical key → policy, plus identity → canonical key.
//!
//! Both maps live behind one lock and are only ever changed together, so a
//! reader never observes one without the other.
//!
//! Two policies with the same namespace and selector share a canonical key.
//! The later write wins the key and the displaced policy's identity entry is
//! dropped with a warning, so every identity entry keeps pointing at a
//! record that carries that identity.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use flipper_core::{ActionKind, CanonicalKey, ChangeEvent, PolicyName, PolicyRecord};

use crate::feed::EventStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PolicyMaps {
    by_key: HashMap<CanonicalKey, PolicyRecord>,
    by_identity: HashMap<PolicyName, CanonicalKey>,
}

impl PolicyMaps {
    fn upsert(&mut self, record: PolicyRecord) {
        let key = record.canonical_key();
        let name = record.name.clone();

        // Selector change on update: the old key must not be left behind.
        if let Some(previous) = self.by_identity.get(&name).cloned() {
            if previous != key {
                self.remove_owned(&previous, &name);
            }
        }

        if let Some(displaced) = self.by_key.get(&key) {
            if displaced.name != name {
                tracing::warn!(
                    key = %key,
                    displaced = %displaced.name,
                    policy = %name,
                    "policy selector collides with an existing policy; last write wins",
                );
                let displaced = displaced.name.clone();
                self.by_identity.remove(&displaced);
            }
        }

        self.by_key.insert(key.clone(), record);
        self.by_identity.insert(name, key);
    }

    fn delete(&mut self, name: &PolicyName) {
        match self.by_identity.remove(name) {
            Some(key) => self.remove_owned(&key, name),
            None => tracing::debug!(policy = %name, "delete for unknown policy ignored"),
        }
    }

    /// Remove `key` only while it still belongs to `name`.
    fn remove_owned(&mut self, key: &CanonicalKey, name: &PolicyName) {
        if self.by_key.get(key).is_some_and(|record| &record.name == name) {
            self.by_key.remove(key);
        }
    }
}

/// Consistent copy of both index maps, taken under one lock acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyIndexView {
    pub by_key: HashMap<CanonicalKey, PolicyRecord>,
    pub by_identity: HashMap<PolicyName, CanonicalKey>,
}

impl PolicyIndexView {
    /// Every identity resolves to a keyed record carrying that identity, and
    /// every keyed record is reachable from its identity.
    pub fn is_consistent(&self) -> bool {
        let forward = self.by_identity.iter().all(|(name, key)| {
            self.by_key
                .get(key)
                .is_some_and(|record| &record.name == name)
        });
        let backward = self
            .by_key
            .iter()
            .all(|(key, record)| self.by_identity.get(&record.name) == Some(key));
        forward && backward
    }
}

/// Concurrency-safe policy store.
#[derive(Debug, Default)]
pub struct PolicyIndex {
    maps: RwLock<PolicyMaps>,
}

impl PolicyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a full listing.
    pub fn seeded(records: impl IntoIterator<Item = PolicyRecord>) -> Self {
        let mut maps = PolicyMaps::default();
        for record in records {
            maps.upsert(record);
        }
        Self {
            maps: RwLock::new(maps),
        }
    }

    /// Apply one change event.
    ///
    /// `Updated` for an unknown identity inserts, and `Deleted` for an unknown
    /// identity is a no-op, so a missed event heals on the next one.
    pub async fn apply(&self, event: ChangeEvent<PolicyRecord>) {
        let mut maps = self.maps.write().await;
        match event.action {
            ActionKind::Added | ActionKind::Updated => match event.record {
                Some(record) => maps.upsert(record),
                None => tracing::warn!(
                    policy = %event.identity,
                    action = %event.action,
                    "policy event without a record ignored",
                ),
            },
            ActionKind::Deleted => maps.delete(&event.identity),
        }
    }

    /// Copy of every stored policy, ordered by name.
    pub async fn snapshot(&self) -> Vec<PolicyRecord> {
        let maps = self.maps.read().await;
        let mut records: Vec<PolicyRecord> = maps.by_key.values().cloned().collect();
        drop(maps);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Copy of both maps, for reporting and consistency checks.
    pub async fn view(&self) -> PolicyIndexView {
        let maps = self.maps.read().await;
        PolicyIndexView {
            by_key: maps.by_key.clone(),
            by_identity: maps.by_identity.clone(),
        }
    }

    pub async fn key_of(&self, name: &PolicyName) -> Option<CanonicalKey> {
        self.maps.read().await.by_identity.get(name).cloned()
    }

    pub async fn get(&self, key: &CanonicalKey) -> Option<PolicyRecord> {
        self.maps.read().await.by_key.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for PolicyIndex {
    type Record = PolicyRecord;
    const KIND: &'static str = "policies";

    async fn apply(&self, event: ChangeEvent<PolicyRecord>) {
        PolicyIndex::apply(self, event).await;
    }
}
