//! Restart markers and the per-workload patch call.
//!
//! The patch is a JSON merge patch that only touches
//! `spec.template.metadata.annotations`, so concurrent edits to the rest of
//! the workload spec are left alone. Changing a pod-template annotation is
//! what makes the platform roll the pods.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use flipper_core::{TriggerPolicy, WorkloadKey, WorkloadRecord};

use crate::error::PatchError;
use crate::transport::PatchTransport;

/// Annotations under this prefix are written by us and never hashed.
pub const MARKER_PREFIX: &str = "flipper.io/";
pub const RESTART_TIME_ANNOTATION: &str = "flipper.io/deployment-restart-time";
pub const SPEC_HASH_ANNOTATION: &str = "flipper.io/deployment-hash";

/// Pod-template annotations to merge into one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationPatch {
    pub annotations: BTreeMap<String, String>,
}

impl AnnotationPatch {
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            annotations: BTreeMap::from([(key.into(), value.into())]),
        }
    }

    /// `{"spec":{"template":{"metadata":{"annotations":{...}}}}}`
    pub fn to_merge_patch(&self) -> Value {
        json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": self.annotations,
                    }
                }
            }
        })
    }

    /// Compact JSON body of [`Self::to_merge_patch`].
    pub fn encode(&self, target: &WorkloadKey) -> Result<String, PatchError> {
        serde_json::to_string(&self.to_merge_patch()).map_err(|source| PatchError::Encode {
            target: target.clone(),
            source,
        })
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    namespace: &'a str,
    name: &'a str,
    labels: BTreeMap<&'a String, &'a String>,
    annotations: BTreeMap<&'a String, &'a String>,
}

fn sorted(map: &HashMap<String, String>) -> BTreeMap<&String, &String> {
    map.iter()
        .filter(|(key, _)| !key.starts_with(MARKER_PREFIX))
        .collect()
}

/// SHA-256 hex digest of the workload's canonical content.
///
/// Maps are sorted before serialization and our own marker annotations are
/// left out, so the digest only moves when somebody else changed the
/// workload.
pub fn spec_hash(workload: &WorkloadRecord) -> Result<String, PatchError> {
    let input = HashInput {
        namespace: &workload.namespace,
        name: &workload.name,
        labels: sorted(&workload.labels),
        annotations: sorted(&workload.pod_template_annotations),
    };
    let encoded = serde_json::to_vec(&input).map_err(|source| PatchError::Encode {
        target: workload.key(),
        source,
    })?;

    let mut h = Sha256::new();
    h.update(&encoded);
    Ok(hex::encode(h.finalize()))
}

/// Build the restart marker for `workload` under `policy` at time `now`.
pub fn restart_marker(
    policy: TriggerPolicy,
    workload: &WorkloadRecord,
    now: DateTime<Utc>,
) -> Result<AnnotationPatch, PatchError> {
    match policy {
        TriggerPolicy::Timestamp => Ok(AnnotationPatch::single(
            RESTART_TIME_ANNOTATION,
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
        TriggerPolicy::SpecHash => Ok(AnnotationPatch::single(
            SPEC_HASH_ANNOTATION,
            spec_hash(workload)?,
        )),
    }
}

/// Sends one restart patch per call through a shared transport.
#[derive(Clone)]
pub struct PatchExecutor {
    transport: Arc<dyn PatchTransport>,
    trigger: TriggerPolicy,
}

impl std::fmt::Debug for PatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchExecutor")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl PatchExecutor {
    pub fn new(transport: Arc<dyn PatchTransport>, trigger: TriggerPolicy) -> Self {
        Self { transport, trigger }
    }

    pub fn trigger(&self) -> TriggerPolicy {
        self.trigger
    }

    /// Patch `workload` with a fresh restart marker.
    pub async fn execute(&self, workload: &WorkloadRecord) -> Result<(), PatchError> {
        self.execute_at(workload, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        workload: &WorkloadRecord,
        now: DateTime<Utc>,
    ) -> Result<(), PatchError> {
        let target = workload.key();
        let patch = restart_marker(self.trigger, workload, now)?;
        tracing::debug!(workload = %target, annotations = ?patch.annotations, "sending restart patch");
        self.transport.apply_patch(&target, &patch).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn workload() -> WorkloadRecord {
        let mut w = WorkloadRecord::new(
            "prod",
            "a",
            HashMap::from([("tier".to_string(), "web".to_string())]),
        );
        w.pod_template_annotations
            .insert("team".to_string(), "payments".to_string());
        w
    }

    #[test]
    fn timestamp_marker_is_rfc3339_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let patch = restart_marker(TriggerPolicy::Timestamp, &workload(), now).unwrap();
        assert_eq!(
            patch.annotations.get(RESTART_TIME_ANNOTATION).map(String::as_str),
            Some("2026-03-01T12:30:00.000Z")
        );
        assert_eq!(patch.annotations.len(), 1);
    }

    #[test]
    fn merge_patch_only_touches_template_annotations() {
        let patch = AnnotationPatch::single(RESTART_TIME_ANNOTATION, "t");
        let body = patch.to_merge_patch();
        assert_eq!(
            body,
            json!({"spec": {"template": {"metadata": {"annotations": {RESTART_TIME_ANNOTATION: "t"}}}}})
        );
        let spec = body["spec"].as_object().unwrap();
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn spec_hash_ignores_own_markers() {
        let plain = workload();
        let mut marked = workload();
        marked
            .pod_template_annotations
            .insert(SPEC_HASH_ANNOTATION.to_string(), "old".to_string());
        marked
            .pod_template_annotations
            .insert(RESTART_TIME_ANNOTATION.to_string(), "then".to_string());

        assert_eq!(spec_hash(&plain).unwrap(), spec_hash(&marked).unwrap());
        assert_eq!(spec_hash(&plain).unwrap().len(), 64);
    }

    #[test]
    fn spec_hash_moves_with_content() {
        let before = workload();
        let mut after = workload();
        after.labels.insert("env".to_string(), "x".to_string());
        assert_ne!(spec_hash(&before).unwrap(), spec_hash(&after).unwrap());
    }
}
