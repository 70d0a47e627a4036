//! Error types for flipper-patch.

use thiserror::Error;

use flipper_core::WorkloadKey;

/// All errors that can arise while building or sending one patch.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The transport reached the API and the patch was refused, or the
    /// transport itself failed mid-request.
    #[error("patch of {target} failed: {message}")]
    Transport { target: WorkloadKey, message: String },

    /// The patch body (or the hash input) could not be serialized.
    #[error("failed to encode patch for {target}: {source}")]
    Encode {
        target: WorkloadKey,
        #[source]
        source: serde_json::Error,
    },

    /// The external patch command could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
