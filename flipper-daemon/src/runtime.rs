use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use flipper_core::{ChangeEvent, ControllerConfig, PolicyRecord, WorkloadRecord};
use flipper_patch::{PatchExecutor, PatchTransport};
use flipper_store::{consume, EventStore, PolicyIndex, WorkloadCache};

use crate::error::{io_err, DaemonError};
use crate::inventory::{watch_inventory, Inventory};
use crate::paths::{DEFAULT_INVENTORY_PATH, EVENT_CHANNEL_CAPACITY};
use crate::scheduler::{RolloutScheduler, SchedulerConfig, TickReport};

/// The two stores, shared between their consumer tasks and the scheduler.
#[derive(Debug, Clone)]
pub struct Stores {
    pub policies: Arc<PolicyIndex>,
    pub workloads: Arc<WorkloadCache>,
}

impl Stores {
    /// Seed from the initial listing. The config's own policy goes in first,
    /// so an inventory policy that collides with it on canonical key wins.
    pub fn seed(config: &ControllerConfig, inventory: &Inventory) -> Self {
        let policies =
            std::iter::once(config.policy()).chain(inventory.policies.iter().cloned());
        Self {
            policies: Arc::new(PolicyIndex::seeded(policies)),
            workloads: Arc::new(WorkloadCache::seeded(inventory.workloads.iter().cloned())),
        }
    }
}

/// `--inventory` if given, else the default path when it exists.
pub fn resolve_inventory_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_INVENTORY_PATH);
        default.is_file().then_some(default)
    })
}

/// Read the initial listing; no path means an empty one.
pub fn load_inventory(path: Option<&Path>) -> Result<Inventory, DaemonError> {
    match path {
        Some(path) => Inventory::load_at(path),
        None => Ok(Inventory::default()),
    }
}

fn executor(config: &ControllerConfig, transport: Arc<dyn PatchTransport>) -> PatchExecutor {
    PatchExecutor::new(transport, config.trigger)
}

/// Start the controller and block the current thread until it exits.
pub fn start_blocking(
    config: ControllerConfig,
    inventory_path: Option<PathBuf>,
    transport: Arc<dyn PatchTransport>,
    log_json: bool,
) -> Result<(), DaemonError> {
    init_tracing(log_json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, inventory_path, transport))
}

/// Run the controller until ctrl-c.
pub async fn run(
    config: ControllerConfig,
    inventory_path: Option<PathBuf>,
    transport: Arc<dyn PatchTransport>,
) -> Result<(), DaemonError> {
    let inventory = load_inventory(inventory_path.as_deref())?;
    let stores = Stores::seed(&config, &inventory);
    tracing::info!(
        policy = %config.name,
        policies = inventory.policies.len() + 1,
        workloads = inventory.workloads.len(),
        interval = ?config.interval,
        trigger = ?config.trigger,
        "starting rollout controller",
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down controller");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Task {
                        task: "signal_handler",
                        message: format!("ctrl-c handler failed: {err}"),
                    }),
                },
            }
        })
    };

    let source = inventory_path.map(|path| (path, inventory));
    let served = serve(&config, stores, source, transport, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    let signal = handle_join("signal_handler", signal_handle.await);
    served.and(signal)
}

/// Spawn the store consumers, the inventory watcher (when `source` is
/// given) and the scheduler, and wait for all of them. Every task stops on
/// `shutdown`; the watcher and the scheduler also raise it when they end.
pub async fn serve(
    config: &ControllerConfig,
    stores: Stores,
    source: Option<(PathBuf, Inventory)>,
    transport: Arc<dyn PatchTransport>,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (policy_tx, policy_rx) = mpsc::channel::<ChangeEvent<PolicyRecord>>(EVENT_CHANNEL_CAPACITY);
    let (workload_tx, workload_rx) =
        mpsc::channel::<ChangeEvent<WorkloadRecord>>(EVENT_CHANNEL_CAPACITY);

    let mut tasks: Vec<(&'static str, JoinHandle<Result<(), DaemonError>>)> = Vec::new();

    tasks.push((
        "policy_consumer",
        spawn_consumer(stores.policies.clone(), policy_rx, shutdown.subscribe()),
    ));
    tasks.push((
        "workload_consumer",
        spawn_consumer(stores.workloads.clone(), workload_rx, shutdown.subscribe()),
    ));

    match source {
        Some((path, current)) => {
            let shutdown = shutdown.clone();
            let shutdown_rx = shutdown.subscribe();
            tasks.push((
                "inventory_watcher",
                tokio::spawn(async move {
                    let result =
                        watch_inventory(path, current, policy_tx, workload_tx, shutdown_rx).await;
                    if let Err(err) = &result {
                        tracing::error!(error = %err, "inventory watcher failed");
                    }
                    let _ = shutdown.send(());
                    result
                }),
            ));
        }
        // No watcher: the consumers drain out once the senders are gone.
        None => drop((policy_tx, workload_tx)),
    }

    let scheduler = RolloutScheduler::new(
        stores.policies,
        stores.workloads,
        executor(config, transport),
        SchedulerConfig::from(config),
    );
    {
        let shutdown = shutdown.clone();
        let stop = shutdown.subscribe();
        tasks.push((
            "scheduler",
            tokio::spawn(async move {
                scheduler.run(stop).await;
                let _ = shutdown.send(());
                Ok(())
            }),
        ));
    }

    let mut first_error = None;
    for (task, handle) in tasks {
        if let Err(err) = handle_join(task, handle.await) {
            tracing::error!(task, error = %err, "controller task failed");
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn spawn_consumer<S: EventStore>(
    store: Arc<S>,
    events: mpsc::Receiver<ChangeEvent<S::Record>>,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<Result<(), DaemonError>> {
    tokio::spawn(async move {
        let applied = consume(store, events, shutdown_rx).await;
        tracing::debug!(store = S::KIND, applied, "store consumer finished");
        Ok(())
    })
}

/// One match-and-dispatch pass over the given listing, without timers or
/// watchers.
pub async fn run_once(
    config: &ControllerConfig,
    inventory: &Inventory,
    transport: Arc<dyn PatchTransport>,
) -> TickReport {
    let stores = Stores::seed(config, inventory);
    let mut scheduler = RolloutScheduler::new(
        stores.policies,
        stores.workloads,
        executor(config, transport),
        SchedulerConfig::from(config),
    );
    scheduler.tick().await
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: format!("join failure: {err}"),
        }),
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides the
/// `info` default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
