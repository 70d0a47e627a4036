//! Controller configuration.
//!
//! The config file describes the one policy a minimal deployment runs with,
//! plus the knobs of the rollout scheduler:
//!
//! ```yaml
//! name: web-restarts
//! kube_namespace: flipper
//! interval: 20s
//! namespace: prod
//! labels:
//!   tier: web
//! max_concurrent_patches: 16
//! trigger: timestamp
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{PolicyName, PolicyRecord};

/// Where the controller looks for its config when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/config/controller-config.yaml";

pub const DEFAULT_MAX_CONCURRENT_PATCHES: usize = 16;

/// Which restart marker is written into the pod template on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Stamp the current time: every tick restarts every match.
    #[default]
    Timestamp,
    /// Stamp a content hash: restarts only when the workload content changed.
    SpecHash,
}

impl std::fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerPolicy::Timestamp => f.write_str("timestamp"),
            TriggerPolicy::SpecHash => f.write_str("spec-hash"),
        }
    }
}

/// Parsed controller config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_policy_name")]
    pub name: PolicyName,
    /// Namespace the policy object itself lives in; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_namespace: Option<String>,
    #[serde(with = "serde_interval")]
    pub interval: Duration,
    /// Target namespace of the seeded policy.
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default = "default_max_concurrent_patches")]
    pub max_concurrent_patches: usize,
    #[serde(default)]
    pub trigger: TriggerPolicy,
}

fn default_policy_name() -> PolicyName {
    PolicyName::from("default")
}

fn default_max_concurrent_patches() -> usize {
    DEFAULT_MAX_CONCURRENT_PATCHES
}

impl ControllerConfig {
    /// Load and validate the config at `path`.
    ///
    /// A missing file is an error: the controller has no meaningful default
    /// target namespace to fall back to.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&contents).map_err(|err| match err {
            CoreError::Parse { source, .. } => CoreError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// `load_at` convenience wrapper for [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Parse and validate config YAML that did not come from a file.
    pub fn from_yaml_str(contents: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(contents).map_err(|source| CoreError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.namespace.trim().is_empty() {
            return Err(CoreError::Invalid("namespace must not be empty".into()));
        }
        if self.name.0.trim().is_empty() {
            return Err(CoreError::Invalid("name must not be empty".into()));
        }
        if self.max_concurrent_patches == 0 {
            return Err(CoreError::Invalid(
                "max_concurrent_patches must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The policy this config seeds into the policy index at startup.
    pub fn policy(&self) -> PolicyRecord {
        PolicyRecord::new(
            self.name.clone(),
            self.namespace.clone(),
            self.labels.clone(),
            self.interval,
        )
    }
}

// ---------------------------------------------------------------------------
// Interval strings
// ---------------------------------------------------------------------------

/// Parse a duration like `20s`, `500ms`, `5m` or `1h30m`.
///
/// A bare number is read as seconds. Zero is rejected: a policy that fires
/// continuously is never what was meant.
pub fn parse_interval(value: &str) -> Result<Duration, CoreError> {
    let invalid = |reason| CoreError::InvalidInterval {
        value: value.to_string(),
        reason,
    };

    let s = value.trim();
    if s.is_empty() {
        return Err(invalid("empty"));
    }

    if let Ok(secs) = s.parse::<u64>() {
        return match secs {
            0 => Err(invalid("must be greater than zero")),
            secs => Ok(Duration::from_secs(secs)),
        };
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(invalid("expected a number before each unit"));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let segment = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(3600)),
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit; expected ms, s, m or h")),
        };
        rest = &rest[unit_len..];
        total = total.saturating_add(segment);
    }

    if total.is_zero() {
        return Err(invalid("must be greater than zero"));
    }
    Ok(total)
}

/// Render a duration in the same notation [`parse_interval`] accepts.
pub fn format_interval(value: Duration) -> String {
    let total_ms = value.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    let mut out = String::new();
    for (amount, unit) in [(hours, "h"), (minutes, "m"), (seconds, "s"), (millis, "ms")] {
        if amount > 0 {
            out.push_str(&format!("{amount}{unit}"));
        }
    }
    out
}

/// `#[serde(with = ...)]` adapter storing a `Duration` as an interval string.
pub(crate) mod serde_interval {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_interval(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = match IntervalRepr::deserialize(deserializer)? {
            IntervalRepr::Text(text) => text,
            IntervalRepr::Seconds(secs) => secs.to_string(),
        };
        super::parse_interval(&text).map_err(serde::de::Error::custom)
    }

    // YAML reads `interval: 20` as an integer.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntervalRepr {
        Seconds(u64),
        Text(String),
    }
}
