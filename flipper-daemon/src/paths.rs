use std::time::Duration;

/// Inventory file read when `--inventory` is not given.
pub const DEFAULT_INVENTORY_PATH: &str = "/etc/config/inventory.yaml";

/// Quiet period after an inventory change before it is re-read; editors
/// write in bursts.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Capacity of each store's change-event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
