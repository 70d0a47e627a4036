//! `KubectlTransport` against a stand-in `kubectl` script, and the executor
//! on top of it.

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flipper_core::{TriggerPolicy, WorkloadKey, WorkloadRecord};
use flipper_patch::{
    AnnotationPatch, KubectlTransport, PatchError, PatchExecutor, PatchTransport,
    RESTART_TIME_ANNOTATION, SPEC_HASH_ANNOTATION,
};
use tempfile::TempDir;

/// Write an executable shell script that records its argv and then runs `tail`.
fn fake_kubectl(dir: &Path, tail: &str) -> (PathBuf, PathBuf) {
    let log = dir.join("argv.log");
    let script = dir.join("kubectl");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nfor a in \"$@\"; do printf '%s\\n' \"$a\" >> '{}'; done\n{tail}\n",
            log.display()
        ),
    )
    .expect("write script");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    (script, log)
}

fn recorded_args(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .expect("argv log")
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn successful_patch_passes_merge_body() {
    let dir = TempDir::new().expect("tempdir");
    let (script, log) = fake_kubectl(dir.path(), "exit 0");
    let transport = KubectlTransport::new(script.as_os_str());

    let patch = AnnotationPatch::single(RESTART_TIME_ANNOTATION, "2026-01-01T00:00:00.000Z");
    transport
        .apply_patch(&WorkloadKey::new("prod", "web"), &patch)
        .await
        .expect("patch");

    let args = recorded_args(&log);
    assert_eq!(
        &args[..8],
        ["patch", "deployment", "web", "-n", "prod", "--type", "merge", "-p"]
    );
    let body: serde_json::Value = serde_json::from_str(&args[8]).expect("json body");
    assert_eq!(
        body["spec"]["template"]["metadata"]["annotations"][RESTART_TIME_ANNOTATION],
        "2026-01-01T00:00:00.000Z"
    );
}

#[tokio::test]
async fn non_zero_exit_becomes_transport_error_with_stderr() {
    let dir = TempDir::new().expect("tempdir");
    let (script, _log) = fake_kubectl(
        dir.path(),
        "echo 'Error from server (NotFound): deployments.apps \"web\" not found' >&2\nexit 1",
    );
    let transport = KubectlTransport::new(script.as_os_str());

    let err = transport
        .apply_patch(
            &WorkloadKey::new("prod", "web"),
            &AnnotationPatch::single("k", "v"),
        )
        .await
        .unwrap_err();

    match &err {
        PatchError::Transport { target, message } => {
            assert_eq!(target.to_string(), "prod.web");
            assert!(message.contains("NotFound"), "got: {message}");
        }
        other => panic!("expected transport error, got: {other}"),
    }
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
    let dir = TempDir::new().expect("tempdir");
    let transport = KubectlTransport::new(dir.path().join("no-such-kubectl").as_os_str());
    let err = transport
        .apply_patch(
            &WorkloadKey::new("prod", "web"),
            &AnnotationPatch::single("k", "v"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PatchError::Spawn { .. }), "got: {err}");
}

#[tokio::test]
async fn executor_sends_spec_hash_marker_when_configured() {
    let dir = TempDir::new().expect("tempdir");
    let (script, log) = fake_kubectl(dir.path(), "exit 0");
    let executor = PatchExecutor::new(
        Arc::new(KubectlTransport::new(script.as_os_str())),
        TriggerPolicy::SpecHash,
    );

    let workload = WorkloadRecord::new(
        "prod",
        "web",
        HashMap::from([("tier".to_string(), "web".to_string())]),
    );
    executor.execute(&workload).await.expect("execute");

    let args = recorded_args(&log);
    let body: serde_json::Value = serde_json::from_str(args.last().expect("body")).expect("json");
    let annotations = body["spec"]["template"]["metadata"]["annotations"]
        .as_object()
        .expect("annotations");
    assert_eq!(annotations.len(), 1);
    assert_eq!(
        annotations[SPEC_HASH_ANNOTATION].as_str(),
        Some(flipper_patch::spec_hash(&workload).expect("hash").as_str())
    );
}
