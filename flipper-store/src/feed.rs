//! Single-consumer change feed.
//!
//! Events for one store are applied strictly in arrival order by exactly one
//! task; no two events for the same store ever run concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use flipper_core::{ChangeEvent, Identified};

/// A store mutated by applying [`ChangeEvent`]s.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    type Record: Identified + Send + Sync + 'static;

    /// Short name used in log fields.
    const KIND: &'static str;

    /// Apply one event under the store's exclusive lock.
    async fn apply(&self, event: ChangeEvent<Self::Record>);
}

/// Drain `events` into `store` until the channel closes or shutdown fires.
///
/// Returns the number of events applied.
pub async fn consume<S: EventStore>(
    store: Arc<S>,
    mut events: mpsc::Receiver<ChangeEvent<S::Record>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> usize {
    let mut applied = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(store = S::KIND, "change feed closed");
                    break;
                };
                tracing::debug!(
                    store = S::KIND,
                    action = %event.action,
                    identity = %event.identity,
                    "applying change event",
                );
                store.apply(event).await;
                applied += 1;
            }
        }
    }

    tracing::info!(store = S::KIND, applied, "change consumer stopped");
    applied
}
