//! S3 — a pod registering and immediately dropping out (a network flap)
//! resets the damper on each event but still yields at most one sweep,
//! reflecting only the membership that is stable once the damper elapses.

mod common;

use std::time::Duration;

use pod_agent::watcher::ClusterWatcher;
use shared::paths;
use tokio::sync::mpsc;

#[tokio::test]
async fn a_flapping_pod_yields_at_most_one_sweep() {
    let (client, memory) = common::shared_store();
    let cluster = "marathon.demo".to_string();

    let watcher = ClusterWatcher::new(client.clone(), cluster.clone(), Vec::new(), Duration::from_millis(40));
    let (sweep_tx, mut sweep_rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { watcher.run(sweep_tx).await });

    let prefix = paths::pod_node_prefix(&cluster);
    for _ in 0..4 {
        let descriptor = common::descriptor(&cluster, 0);
        let (path, _seq) = client
            .create_ephemeral_sequential(&prefix, serde_json::to_vec(&descriptor).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        memory.drop_session(&[path]);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let final_descriptor = common::descriptor(&cluster, 0);
    client
        .create_ephemeral_sequential(&prefix, serde_json::to_vec(&final_descriptor).unwrap())
        .await
        .unwrap();

    let snapshot = tokio::time::timeout(Duration::from_millis(300), sweep_rx.recv())
        .await
        .expect("a sweep should eventually fire")
        .expect("channel should still be open");
    assert_eq!(snapshot.members.len(), 1);

    assert!(
        tokio::time::timeout(Duration::from_millis(100), sweep_rx.recv())
            .await
            .is_err(),
        "the flap should not produce more than one sweep"
    );

    handle.abort();
}
