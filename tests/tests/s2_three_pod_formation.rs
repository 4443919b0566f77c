//! S2 — three pods register within the damper window; the watcher should
//! coalesce their arrival into a single sweep request carrying all three.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pod_agent::registry::Registry;
use pod_agent::watcher::ClusterWatcher;
use shared::model::PodDescriptor;
use tokio::sync::mpsc;

#[tokio::test]
async fn three_registrations_within_the_damper_yield_one_snapshot() {
    let (client, _memory) = common::shared_store();
    let cluster = "marathon.demo".to_string();

    let watcher = ClusterWatcher::new(client.clone(), cluster.clone(), Vec::new(), Duration::from_millis(40));
    let (sweep_tx, mut sweep_rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { watcher.run(sweep_tx).await });

    let mut registries = Vec::new();
    for i in 0..3 {
        let mut descriptor = PodDescriptor::default();
        descriptor.cluster = cluster.clone();
        descriptor.node = format!("host-{i}");
        let registry = Registry::new(client.clone(), descriptor);
        registry.register(1).await.unwrap();
        registries.push(registry);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let snapshot = tokio::time::timeout(Duration::from_millis(300), sweep_rx.recv())
        .await
        .expect("a sweep should have fired")
        .expect("channel should still be open");
    assert_eq!(snapshot.members.len(), 3);

    assert!(
        tokio::time::timeout(Duration::from_millis(100), sweep_rx.recv())
            .await
            .is_err(),
        "the whole burst should coalesce into a single sweep"
    );

    handle.abort();
}
