//! Workload cache keyed by `(namespace, name)`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use flipper_core::{ActionKind, ChangeEvent, WorkloadKey, WorkloadRecord};

use crate::feed::EventStore;

pub type WorkloadMap = HashMap<WorkloadKey, WorkloadRecord>;

/// Concurrency-safe workload store.
///
/// Mutation is serialized by its single consumer; the lock exists because
/// the scheduler snapshots from another task.
#[derive(Debug, Default)]
pub struct WorkloadCache {
    workloads: RwLock<WorkloadMap>,
}

impl WorkloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a full listing.
    pub fn seeded(records: impl IntoIterator<Item = WorkloadRecord>) -> Self {
        let workloads = records.into_iter().map(|w| (w.key(), w)).collect();
        Self {
            workloads: RwLock::new(workloads),
        }
    }

    /// Apply one change event.
    ///
    /// Deletes are keyed by the event identity; the payload of a delete may be
    /// absent or stale.
    pub async fn apply(&self, event: ChangeEvent<WorkloadRecord>) {
        let mut workloads = self.workloads.write().await;
        match event.action {
            ActionKind::Added | ActionKind::Updated => match event.record {
                Some(record) => {
                    workloads.insert(record.key(), record);
                }
                None => tracing::warn!(
                    workload = %event.identity,
                    action = %event.action,
                    "workload event without a record ignored",
                ),
            },
            ActionKind::Deleted => {
                if workloads.remove(&event.identity).is_none() {
                    tracing::debug!(workload = %event.identity, "delete for unknown workload ignored");
                }
            }
        }
    }

    /// Copy of every cached workload, ordered by key.
    pub async fn snapshot(&self) -> Vec<WorkloadRecord> {
        let workloads = self.workloads.read().await;
        let mut records: Vec<WorkloadRecord> = workloads.values().cloned().collect();
        drop(workloads);
        records.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        records
    }

    pub async fn get(&self, key: &WorkloadKey) -> Option<WorkloadRecord> {
        self.workloads.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.workloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for WorkloadCache {
    type Record = WorkloadRecord;
    const KIND: &'static str = "workloads";

    async fn apply(&self, event: ChangeEvent<WorkloadRecord>) {
        WorkloadCache::apply(self, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_uses_event_identity_not_payload() {
        let cache = WorkloadCache::seeded([WorkloadRecord::new("prod", "a", HashMap::new())]);

        // A stale payload pointing elsewhere must not redirect the delete.
        let event = ChangeEvent {
            action: ActionKind::Deleted,
            identity: WorkloadKey::new("prod", "a"),
            record: Some(WorkloadRecord::new("stage", "zzz", HashMap::new())),
        };
        cache.apply(event).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let cache = WorkloadCache::seeded([WorkloadRecord::new("prod", "a", HashMap::new())]);
        let snapshot = cache.snapshot().await;
        cache
            .apply(ChangeEvent::deleted(WorkloadKey::new("prod", "a")))
            .await;
        assert_eq!(snapshot.len(), 1);
        assert!(cache.is_empty().await);
    }
}
