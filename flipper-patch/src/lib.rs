//! # flipper-patch
//!
//! Builds the rollout-forcing annotation patch for one workload and hands it
//! to a [`PatchTransport`].
//!
//! [`PatchExecutor::execute`] sends exactly one patch per call and never
//! retries; the next scheduler tick is the retry.

pub mod error;
pub mod executor;
pub mod transport;

pub use error::PatchError;
pub use executor::{
    restart_marker, spec_hash, AnnotationPatch, PatchExecutor, MARKER_PREFIX,
    RESTART_TIME_ANNOTATION, SPEC_HASH_ANNOTATION,
};
pub use transport::{DryRunTransport, KubectlTransport, PatchTransport};
