//! Domain types for policies, workloads and the change events that feed them.
//!
//! Label maps are plain `HashMap`s: their iteration order is undefined, so
//! anything that needs a stable byte representation goes through
//! [`PolicyRecord::canonical_key`] or sorts explicitly.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Separator between the namespace and the serialized label pairs.
pub const KEY_NAMESPACE_SEPARATOR: char = '|';
/// Separator between serialized `key=value` label pairs.
pub const KEY_LABEL_SEPARATOR: char = ',';

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity of a policy (unique within the policy source).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyName(pub String);

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PolicyName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PolicyName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Deterministic primary-index key of a policy: target namespace plus the
/// sorted `key=value` pairs of its selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey(pub String);

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a workload: `(namespace, name)`, rendered as `namespace.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A rule binding a namespace and a label selector to a restart interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub name: PolicyName,
    pub target_namespace: String,
    #[serde(default)]
    pub label_selector: HashMap<String, String>,
    #[serde(with = "crate::config::serde_interval")]
    pub interval: Duration,
}

impl PolicyRecord {
    pub fn new(
        name: impl Into<PolicyName>,
        target_namespace: impl Into<String>,
        label_selector: HashMap<String, String>,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            target_namespace: target_namespace.into(),
            label_selector,
            interval,
        }
    }

    /// Derive the canonical index key.
    ///
    /// Pairs are sorted by label key before joining, so two records with the
    /// same namespace and the same label content always produce identical
    /// bytes. An empty selector yields the bare namespace.
    ///
    /// Separator characters inside a namespace, label key or value are
    /// backslash-escaped, so distinct selectors never share a key.
    pub fn canonical_key(&self) -> CanonicalKey {
        let namespace = escape_key_part(&self.target_namespace);
        if self.label_selector.is_empty() {
            return CanonicalKey(namespace);
        }

        let mut pairs: Vec<(&String, &String)> = self.label_selector.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let labels = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", escape_key_part(k), escape_key_part(v)))
            .collect::<Vec<_>>()
            .join(&KEY_LABEL_SEPARATOR.to_string());

        CanonicalKey(format!("{namespace}{KEY_NAMESPACE_SEPARATOR}{labels}"))
    }
}

fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '\\' | '=' | KEY_NAMESPACE_SEPARATOR | KEY_LABEL_SEPARATOR) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Snapshot of a managed workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub pod_template_annotations: HashMap<String, String>,
}

impl WorkloadRecord {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels,
            pod_template_annotations: HashMap::new(),
        }
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(self.namespace.clone(), self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// Kind of mutation carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Added => write!(f, "added"),
            ActionKind::Updated => write!(f, "updated"),
            ActionKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A record type that can travel in a [`ChangeEvent`].
pub trait Identified {
    type Id: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn identity(&self) -> Self::Id;
}

impl Identified for PolicyRecord {
    type Id = PolicyName;

    fn identity(&self) -> PolicyName {
        self.name.clone()
    }
}

impl Identified for WorkloadRecord {
    type Id = WorkloadKey;

    fn identity(&self) -> WorkloadKey {
        self.key()
    }
}

/// One mutation delivered on a store's inbound channel.
///
/// The identity travels independently of the payload: a `Deleted` event
/// usually has no record at all, and must never be resolved by looking
/// inside one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent<R: Identified> {
    pub action: ActionKind,
    pub identity: R::Id,
    pub record: Option<R>,
}

impl<R: Identified> ChangeEvent<R> {
    pub fn added(record: R) -> Self {
        Self {
            action: ActionKind::Added,
            identity: record.identity(),
            record: Some(record),
        }
    }

    pub fn updated(record: R) -> Self {
        Self {
            action: ActionKind::Updated,
            identity: record.identity(),
            record: Some(record),
        }
    }

    pub fn deleted(identity: R::Id) -> Self {
        Self {
            action: ActionKind::Deleted,
            identity,
            record: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
