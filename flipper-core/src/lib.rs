//! Flipper core library — domain types, matching, config, error aggregation.
//!
//! - [`types`] — identities, policy / workload records, change events
//! - [`matcher`] — the policy → workload predicate
//! - [`config`] — controller config file and interval strings
//! - [`multi_error`] — [`MultiError`], the per-tick error aggregate
//! - [`error`] — [`CoreError`]

pub mod config;
pub mod error;
pub mod matcher;
pub mod multi_error;
pub mod types;

pub use config::{format_interval, parse_interval, ControllerConfig, TriggerPolicy};
pub use error::CoreError;
pub use matcher::{match_set, matches};
pub use multi_error::MultiError;
pub use types::{
    ActionKind, CanonicalKey, ChangeEvent, Identified, PolicyName, PolicyRecord, WorkloadKey,
    WorkloadRecord,
};
