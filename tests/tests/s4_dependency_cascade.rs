//! S4 — a dependency cluster publishing a new `hash` node wakes a
//! dependent cluster's watcher even with no membership change of its own.

mod common;

use std::time::Duration;

use pod_agent::watcher::ClusterWatcher;
use shared::paths;
use tokio::sync::mpsc;

#[tokio::test]
async fn dependency_hash_change_triggers_a_sweep() {
    let (client, _memory) = common::shared_store();
    let cluster = "marathon.frontend".to_string();
    let dependency = "marathon.backend".to_string();

    let descriptor = common::descriptor(&cluster, 0);
    let prefix = paths::pod_node_prefix(&cluster);
    client
        .create_ephemeral_sequential(&prefix, serde_json::to_vec(&descriptor).unwrap())
        .await
        .unwrap();

    let watcher = ClusterWatcher::new(
        client.clone(),
        cluster.clone(),
        vec![dependency.clone()],
        Duration::from_millis(40),
    );
    let (sweep_tx, mut sweep_rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { watcher.run(sweep_tx).await });

    // Let the background watches arm before publishing the dependency hash,
    // otherwise the write could race the initial `exists()` call.
    tokio::time::sleep(Duration::from_millis(20)).await;

    client
        .set(&paths::hash_node(&dependency), b"HASH-V1".to_vec())
        .await
        .unwrap();

    let snapshot = tokio::time::timeout(Duration::from_millis(300), sweep_rx.recv())
        .await
        .expect("the dependency hash change should trigger a sweep")
        .expect("channel should still be open");
    assert_eq!(snapshot.members.len(), 1);
    assert_eq!(snapshot.dependencies.get(&dependency), Some(&"HASH-V1".to_string()));

    handle.abort();
}
