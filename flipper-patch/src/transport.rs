//! Patch delivery.
//!
//! The wire protocol to the orchestration API is not ours: a transport
//! either records patches (dry run) or hands them to `kubectl`.

use std::ffi::OsString;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use flipper_core::WorkloadKey;

use crate::error::PatchError;
use crate::executor::AnnotationPatch;

/// Delivers one merge patch against one workload.
#[async_trait]
pub trait PatchTransport: Send + Sync {
    async fn apply_patch(
        &self,
        target: &WorkloadKey,
        patch: &AnnotationPatch,
    ) -> Result<(), PatchError>;
}

/// Logs and records patches instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    applied: Mutex<Vec<(WorkloadKey, AnnotationPatch)>>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every patch seen so far, in arrival order.
    pub async fn applied(&self) -> Vec<(WorkloadKey, AnnotationPatch)> {
        self.applied.lock().await.clone()
    }
}

#[async_trait]
impl PatchTransport for DryRunTransport {
    async fn apply_patch(
        &self,
        target: &WorkloadKey,
        patch: &AnnotationPatch,
    ) -> Result<(), PatchError> {
        let body = patch.encode(target)?;
        tracing::info!(workload = %target, patch = %body, "dry run: would patch");
        self.applied.lock().await.push((target.clone(), patch.clone()));
        Ok(())
    }
}

/// Shells out to `kubectl patch <kind> <name> -n <ns> --type merge -p <json>`.
#[derive(Debug, Clone)]
pub struct KubectlTransport {
    program: OsString,
    kind: String,
    extra_args: Vec<String>,
}

impl Default for KubectlTransport {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlTransport {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            kind: "deployment".to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Resource kind passed to `kubectl patch` (default `deployment`).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Extra leading arguments, e.g. `--context`, `--kubeconfig`.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    fn args(&self, target: &WorkloadKey, body: String) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "patch".to_string(),
            self.kind.clone(),
            target.name.clone(),
            "-n".to_string(),
            target.namespace.clone(),
            "--type".to_string(),
            "merge".to_string(),
            "-p".to_string(),
            body,
        ]);
        args
    }
}

#[async_trait]
impl PatchTransport for KubectlTransport {
    async fn apply_patch(
        &self,
        target: &WorkloadKey,
        patch: &AnnotationPatch,
    ) -> Result<(), PatchError> {
        let body = patch.encode(target)?;
        let output = Command::new(&self.program)
            .args(self.args(target, body))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PatchError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        if output.status.success() {
            tracing::debug!(workload = %target, "kubectl patch applied");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("kubectl exited with {}", output.status)
        } else {
            stderr
        };
        Err(PatchError::Transport {
            target: target.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubectl_args_put_extra_args_first() {
        let transport = KubectlTransport::default()
            .with_kind("statefulset")
            .with_args(["--context".to_string(), "prod-eu".to_string()]);
        let args = transport.args(&WorkloadKey::new("prod", "a"), "{}".to_string());
        assert_eq!(
            args,
            vec![
                "--context", "prod-eu", "patch", "statefulset", "a", "-n", "prod", "--type",
                "merge", "-p", "{}"
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_records_in_order() {
        let transport = DryRunTransport::new();
        let patch = AnnotationPatch::single("k", "v");
        transport
            .apply_patch(&WorkloadKey::new("prod", "a"), &patch)
            .await
            .unwrap();
        transport
            .apply_patch(&WorkloadKey::new("prod", "b"), &patch)
            .await
            .unwrap();

        let applied = transport.applied().await;
        let names: Vec<&str> = applied.iter().map(|(k, _)| k.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
