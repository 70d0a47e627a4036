//! Error types for flipper-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating controller input.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An interval string that is empty, zero, or not `<number><unit>` segments.
    #[error("invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: &'static str },

    /// Structurally valid YAML with values the controller cannot run with.
    #[error("invalid config: {0}")]
    Invalid(String),
}
