//! Controller runtime: the rollout scheduler, the file-backed inventory
//! source, and the task wiring that ties them to the stores.

mod error;
pub mod inventory;
pub mod paths;
mod runtime;
pub mod scheduler;

pub use error::{DaemonError, DispatchError};
pub use inventory::{publish, watch_inventory, Inventory};
pub use runtime::{
    init_tracing, load_inventory, resolve_inventory_path, run, run_once, serve, start_blocking,
    Stores,
};
pub use scheduler::{RolloutScheduler, SchedulerConfig, SchedulerState, TickReport};
