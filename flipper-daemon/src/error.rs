use std::path::PathBuf;

use thiserror::Error;

use flipper_core::WorkloadKey;
use flipper_patch::PatchError;

/// Error surface for the controller runtime and its inventory source.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] flipper_core::CoreError),

    #[error("failed to parse inventory at {path}: {source}")]
    Inventory {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

/// One failed unit of a tick's fan-out.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("patch worker for {workload} did not finish: {message}")]
    Worker {
        workload: WorkloadKey,
        message: String,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
