//! File-backed inventory: the initial listing and a live change feed.
//!
//! ```yaml
//! policies:
//!   - name: web-restarts
//!     target_namespace: prod
//!     label_selector: { tier: web }
//!     interval: 20s
//! workloads:
//!   - namespace: prod
//!     name: a
//!     labels: { tier: web }
//! ```
//!
//! Every change to the file is diffed against the previous listing and
//! turned into change events on the two store channels.

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use flipper_core::{ChangeEvent, Identified, PolicyRecord, WorkloadRecord};

use crate::error::{io_err, DaemonError};
use crate::paths::DEBOUNCE_WINDOW;

/// Full listing of policies and workloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub policies: Vec<PolicyRecord>,
    #[serde(default)]
    pub workloads: Vec<WorkloadRecord>,
}

impl Inventory {
    pub fn load_at(path: &Path) -> Result<Self, DaemonError> {
        let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| DaemonError::Inventory {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Events turning `self`'s policies into `next`'s.
    pub fn policy_events(&self, next: &Inventory) -> Vec<ChangeEvent<PolicyRecord>> {
        diff(&self.policies, &next.policies)
    }

    /// Events turning `self`'s workloads into `next`'s.
    pub fn workload_events(&self, next: &Inventory) -> Vec<ChangeEvent<WorkloadRecord>> {
        diff(&self.workloads, &next.workloads)
    }
}

/// Added, then Updated, then Deleted events, each group in `new`/`old`
/// listing order. Later duplicates of an identity shadow earlier ones.
fn diff<R>(old: &[R], new: &[R]) -> Vec<ChangeEvent<R>>
where
    R: Identified + Clone + PartialEq,
    R::Id: Hash + Eq,
{
    let before: HashMap<R::Id, &R> = old.iter().map(|r| (r.identity(), r)).collect();
    let after: HashMap<R::Id, &R> = new.iter().map(|r| (r.identity(), r)).collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for record in new.iter().rev() {
        let id = record.identity();
        if !seen.insert(id.clone()) {
            continue;
        }
        match before.get(&id) {
            None => added.push(ChangeEvent::added(record.clone())),
            Some(previous) if *previous != record => updated.push(ChangeEvent::updated(record.clone())),
            Some(_) => {}
        }
    }
    added.reverse();
    updated.reverse();

    let mut deleted = Vec::new();
    let mut gone = std::collections::HashSet::new();
    for record in old {
        let id = record.identity();
        if !after.contains_key(&id) && gone.insert(id.clone()) {
            deleted.push(ChangeEvent::deleted(id));
        }
    }

    added.into_iter().chain(updated).chain(deleted).collect()
}

/// Watch `path` and push the difference between successive listings onto
/// the store channels until shutdown.
///
/// The parent directory is watched rather than the file, so editors that
/// replace the file by rename are still seen. A file that fails to parse is
/// skipped; the previous listing stays current.
pub async fn watch_inventory(
    path: PathBuf,
    mut current: Inventory,
    policy_tx: mpsc::Sender<ChangeEvent<PolicyRecord>>,
    workload_tx: mpsc::Sender<ChangeEvent<WorkloadRecord>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let path = fs::canonicalize(&path).map_err(|e| io_err(&path, e))?;
    let Some(dir) = path.parent().map(Path::to_path_buf) else {
        return Err(io_err(
            &path,
            std::io::Error::other("inventory path has no parent directory"),
        ));
    };
    let file_name = path.file_name().map(|n| n.to_os_string());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %path.display(), "watching inventory");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "inventory watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                if !event.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == file_name) {
                    continue;
                }

                // Let the burst settle, then read the final state once.
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(DEBOUNCE_WINDOW) => {}
                }
                while event_rx.try_recv().is_ok() {}

                let next = match Inventory::load_at(&path) {
                    Ok(next) => next,
                    Err(err) => {
                        tracing::warn!(error = %err, "inventory reload failed; keeping previous listing");
                        continue;
                    }
                };

                let (policies, workloads) = match publish(&current, &next, &policy_tx, &workload_tx).await {
                    Ok(counts) => counts,
                    // Consumers hang up on shutdown; that is not a watcher failure.
                    Err(DaemonError::ChannelClosed(_)) if shutdown_raised(&mut shutdown_rx) => break,
                    Err(err) => return Err(err),
                };
                tracing::info!(policies, workloads, "inventory change published");
                current = next;
            }
        }
    }

    Ok(())
}

/// Send the diff between `current` and `next`; returns `(policy, workload)`
/// event counts.
pub async fn publish(
    current: &Inventory,
    next: &Inventory,
    policy_tx: &mpsc::Sender<ChangeEvent<PolicyRecord>>,
    workload_tx: &mpsc::Sender<ChangeEvent<WorkloadRecord>>,
) -> Result<(usize, usize), DaemonError> {
    let policy_events = current.policy_events(next);
    let workload_events = current.workload_events(next);
    let counts = (policy_events.len(), workload_events.len());

    for event in policy_events {
        policy_tx
            .send(event)
            .await
            .map_err(|_| DaemonError::ChannelClosed("policy events"))?;
    }
    for event in workload_events {
        workload_tx
            .send(event)
            .await
            .map_err(|_| DaemonError::ChannelClosed("workload events"))?;
    }
    Ok(counts)
}

fn shutdown_raised(shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty))
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
