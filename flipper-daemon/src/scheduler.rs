//! Rollout scheduler: the periodic match-and-dispatch loop.
//!
//! Each tick snapshots both stores, picks the policies that are due, and
//! patches every workload they match. The fan-out is bounded by a semaphore
//! and fully joined before the tick returns, so ticks never overlap and a
//! slow patch delays the next tick instead of being skipped by it.
//!
//! Results travel over a channel to one collector task, which is the only
//! writer of the tick's [`MultiError`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};

use flipper_core::{match_set, ControllerConfig, MultiError, PolicyName, WorkloadKey, WorkloadRecord};
use flipper_patch::PatchExecutor;
use flipper_store::{PolicyIndex, WorkloadCache};

use crate::error::DispatchError;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    Dispatching,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Timer period.
    pub tick_every: Duration,
    /// Upper bound on patches in flight within one tick.
    pub max_in_flight: usize,
}

impl From<&ControllerConfig> for SchedulerConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            tick_every: config.interval,
            max_in_flight: config.max_concurrent_patches,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Policies that fired on this tick.
    pub due_policies: Vec<PolicyName>,
    /// Distinct workloads matched by the due policies.
    pub matched: Vec<WorkloadKey>,
    /// Patches that succeeded.
    pub patched: usize,
    /// Every failed patch, if any.
    pub errors: Option<MultiError>,
}

impl TickReport {
    pub fn failed(&self) -> usize {
        self.errors.as_ref().map_or(0, MultiError::len)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_none()
    }
}

type DispatchResult = Result<WorkloadKey, DispatchError>;

pub struct RolloutScheduler {
    policies: Arc<PolicyIndex>,
    workloads: Arc<WorkloadCache>,
    executor: PatchExecutor,
    config: SchedulerConfig,
    last_fired: HashMap<PolicyName, Instant>,
    state: SchedulerState,
}

impl RolloutScheduler {
    pub fn new(
        policies: Arc<PolicyIndex>,
        workloads: Arc<WorkloadCache>,
        executor: PatchExecutor,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            policies,
            workloads,
            executor,
            config: SchedulerConfig {
                max_in_flight: config.max_in_flight.max(1),
                ..config
            },
            last_fired: HashMap::new(),
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Tick on the timer until `stop` fires (or its sender is dropped).
    ///
    /// A stop seen between ticks ends the loop at once. A stop that arrives
    /// mid-dispatch is honoured after that tick's join; in-flight patches are
    /// never aborted. Returns the number of ticks run.
    pub async fn run(mut self, mut stop: broadcast::Receiver<()>) -> u64 {
        let mut interval = tokio::time::interval(self.config.tick_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // first tick completes immediately

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = stop.recv() => break,
                at = interval.tick() => {
                    let report = self.tick_at(at).await;
                    ticks += 1;
                    log_report(ticks, &report);
                }
            }
        }

        self.state = SchedulerState::Stopped;
        tracing::info!(ticks, "rollout scheduler stopped");
        ticks
    }

    /// Run one match-and-dispatch pass now.
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    async fn tick_at(&mut self, at: Instant) -> TickReport {
        self.state = SchedulerState::Ticking;

        let policies = self.policies.snapshot().await;
        let workloads = self.workloads.snapshot().await;

        self.last_fired
            .retain(|name, _| policies.iter().any(|p| &p.name == name));

        // `at` is the timer's deadline rather than the wake-up time, so
        // elapsed time between ticks is an exact multiple of the period.
        let mut targets: BTreeMap<WorkloadKey, WorkloadRecord> = BTreeMap::new();
        let mut due_policies = Vec::new();
        for policy in &policies {
            let due = match self.last_fired.get(&policy.name) {
                None => true,
                Some(last) => at.saturating_duration_since(*last) >= policy.interval,
            };
            if !due {
                continue;
            }
            for workload in match_set(policy, &workloads) {
                targets
                    .entry(workload.key())
                    .or_insert_with(|| workload.clone());
            }
            self.last_fired.insert(policy.name.clone(), at);
            due_policies.push(policy.name.clone());
        }

        let matched: Vec<WorkloadKey> = targets.keys().cloned().collect();
        tracing::debug!(
            policies = policies.len(),
            workloads = workloads.len(),
            due = due_policies.len(),
            matched = matched.len(),
            "tick snapshot evaluated",
        );

        self.state = SchedulerState::Dispatching;
        let (patched, errors) = self.dispatch(targets.into_values().collect()).await;
        self.state = SchedulerState::Idle;

        TickReport {
            due_policies,
            matched,
            patched,
            errors: errors.is_set().then_some(errors),
        }
    }

    /// Patch every target, at most `max_in_flight` at a time, and wait for
    /// all of them.
    async fn dispatch(&self, targets: Vec<WorkloadRecord>) -> (usize, MultiError) {
        if targets.is_empty() {
            return (0, MultiError::new());
        }

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let (result_tx, result_rx) = mpsc::unbounded_channel::<DispatchResult>();
        let collector = tokio::spawn(collect(result_rx));

        let mut workers = Vec::with_capacity(targets.len());
        for workload in targets {
            let key = workload.key();
            let permits = permits.clone();
            let executor = self.executor.clone();
            let result_tx = result_tx.clone();
            let handle = tokio::spawn(async move {
                let key = workload.key();
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => executor
                        .execute(&workload)
                        .await
                        .map(|()| key)
                        .map_err(DispatchError::from),
                    Err(_) => Err(DispatchError::Worker {
                        workload: key,
                        message: "dispatch pool closed".to_string(),
                    }),
                };
                let _ = result_tx.send(result);
            });
            workers.push((key, handle));
        }

        // A worker that panicked never reported; report it on its behalf.
        for (key, handle) in workers {
            if let Err(err) = handle.await {
                let _ = result_tx.send(Err(DispatchError::Worker {
                    workload: key,
                    message: err.to_string(),
                }));
            }
        }
        drop(result_tx);

        match collector.await {
            Ok(outcome) => outcome,
            Err(err) => {
                let mut errors = MultiError::new();
                errors.add(format!("result collector failed: {err}"));
                (0, errors)
            }
        }
    }
}

async fn collect(mut results: mpsc::UnboundedReceiver<DispatchResult>) -> (usize, MultiError) {
    let mut patched = 0usize;
    let mut errors = MultiError::new();
    while let Some(result) = results.recv().await {
        match result {
            Ok(key) => {
                patched += 1;
                tracing::debug!(workload = %key, "restart patch applied");
            }
            Err(err) => {
                tracing::debug!(error = %err, "restart patch failed");
                errors.add(err);
            }
        }
    }
    (patched, errors)
}

fn log_report(tick: u64, report: &TickReport) {
    tracing::info!(
        tick,
        due = report.due_policies.len(),
        matched = report.matched.len(),
        patched = report.patched,
        failed = report.failed(),
        "tick completed",
    );
    if let Some(errors) = &report.errors {
        tracing::warn!(tick, failed = errors.len(), "restart patches failed:\n{}", errors.render());
    }
}
