//! Stores, matcher and scheduler wired together, with and without the
//! file-backed inventory feed.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use flipper_core::{match_set, ChangeEvent, ControllerConfig, PolicyRecord, WorkloadKey, WorkloadRecord};
use flipper_daemon::{publish, serve, Inventory, Stores};
use flipper_patch::{DryRunTransport, RESTART_TIME_ANNOTATION};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn config(interval: &str) -> ControllerConfig {
    ControllerConfig::from_yaml_str(&format!(
        "name: web\ninterval: {interval}\nnamespace: prod\nlabels: {{ tier: web }}\n"
    ))
    .expect("config")
}

fn listing() -> Inventory {
    Inventory {
        policies: vec![],
        workloads: vec![
            WorkloadRecord::new("prod", "a", labels(&[("tier", "web")])),
            WorkloadRecord::new("prod", "b", labels(&[("tier", "api")])),
            WorkloadRecord::new("stage", "c", labels(&[("tier", "web")])),
        ],
    }
}

async fn match_keys(stores: &Stores) -> Vec<WorkloadKey> {
    let workloads = stores.workloads.snapshot().await;
    let mut keys = Vec::new();
    for policy in stores.policies.snapshot().await {
        keys.extend(match_set(&policy, &workloads).into_iter().map(WorkloadRecord::key));
    }
    keys.sort();
    keys.dedup();
    keys
}

#[tokio::test]
async fn delete_then_readd_keeps_match_set() {
    let stores = Stores::seed(&config("20s"), &listing());
    assert_eq!(match_keys(&stores).await, vec![WorkloadKey::new("prod", "a")]);

    stores
        .workloads
        .apply(ChangeEvent::deleted(WorkloadKey::new("prod", "a")))
        .await;
    assert!(match_keys(&stores).await.is_empty());

    stores
        .workloads
        .apply(ChangeEvent::added(WorkloadRecord::new(
            "prod",
            "a",
            labels(&[("tier", "web"), ("env", "x")]),
        )))
        .await;
    assert_eq!(match_keys(&stores).await, vec![WorkloadKey::new("prod", "a")]);
}

#[tokio::test]
async fn published_diff_reaches_the_stores() {
    let stores = Stores::seed(&config("20s"), &listing());
    let (policy_tx, policy_rx) = mpsc::channel(16);
    let (workload_tx, workload_rx) = mpsc::channel(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let policies = tokio::spawn(flipper_store::consume(
        stores.policies.clone(),
        policy_rx,
        shutdown_tx.subscribe(),
    ));
    let workloads = tokio::spawn(flipper_store::consume(
        stores.workloads.clone(),
        workload_rx,
        shutdown_tx.subscribe(),
    ));

    let mut next = listing();
    next.workloads.retain(|w| w.name != "a");
    next.workloads[0].labels.insert("tier".to_string(), "web".to_string());
    next.policies.push(PolicyRecord::new(
        "stage-web",
        "stage",
        labels(&[("tier", "web")]),
        Duration::from_secs(60),
    ));

    let counts = publish(&listing(), &next, &policy_tx, &workload_tx)
        .await
        .expect("publish");
    assert_eq!(counts, (1, 2));
    drop((policy_tx, workload_tx));

    assert_eq!(policies.await.expect("join"), 1);
    assert_eq!(workloads.await.expect("join"), 2);
    assert_eq!(
        match_keys(&stores).await,
        vec![WorkloadKey::new("prod", "b"), WorkloadKey::new("stage", "c")]
    );
}

#[tokio::test]
async fn inventory_edit_is_picked_up_while_serving() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("inventory.yaml");
    let initial = Inventory {
        policies: vec![],
        workloads: vec![WorkloadRecord::new("prod", "b", labels(&[("tier", "api")]))],
    };
    fs::write(&path, serde_yaml::to_string(&initial).expect("yaml")).expect("write");

    let config = config("200ms");
    let stores = Stores::seed(&config, &initial);
    let transport = Arc::new(DryRunTransport::new());
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let handle = {
        let stores = stores.clone();
        let transport = transport.clone();
        let shutdown_tx = shutdown_tx.clone();
        let source = Some((path.clone(), initial.clone()));
        tokio::spawn(async move { serve(&config, stores, source, transport, shutdown_tx).await })
    };

    // Give the watcher a moment to register before editing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut edited = initial.clone();
    edited
        .workloads
        .push(WorkloadRecord::new("prod", "a", labels(&[("tier", "web")])));
    fs::write(&path, serde_yaml::to_string(&edited).expect("yaml")).expect("write");

    let patched = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let applied = transport.applied().await;
            if let Some((key, patch)) = applied.first() {
                return (key.clone(), patch.clone());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("workload from the edited inventory was never patched");

    assert_eq!(patched.0, WorkloadKey::new("prod", "a"));
    assert!(patched.1.annotations.contains_key(RESTART_TIME_ANNOTATION));
    assert!(stores.workloads.get(&WorkloadKey::new("prod", "a")).await.is_some());

    let _ = shutdown_tx.send(());
    handle.await.expect("join").expect("serve");
}
