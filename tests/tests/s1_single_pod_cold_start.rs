//! S1 — single pod cold start: a lone pod registers, wins the lock
//! immediately (no predecessor), and reaches `RUNNING` via `/control/on`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use pod_agent::election::Election;
use pod_agent::hook::{Hook, ShellHook};
use pod_agent::lifecycle::Lifecycle;
use pod_agent::registry::Registry;
use shared::api::ClusterSnapshot;
use shared::model::{PodDescriptor, PodRole, ProcessState};

#[tokio::test]
async fn lone_pod_registers_elects_itself_and_runs() {
    let (client, _memory) = common::shared_store();
    let cluster = "marathon.demo".to_string();

    let mut descriptor = PodDescriptor::default();
    descriptor.cluster = cluster.clone();
    descriptor.process = ProcessState::Stopped;

    let registry = Arc::new(Registry::new(client.clone(), descriptor));
    registry.register(3).await.expect("registration should succeed");

    let election = Election::new(client.clone(), cluster.clone());
    let (role_tx, mut role_rx) = watch::channel(PodRole::Follower);
    election.run(&role_tx).await.expect("sole candidate should win immediately");
    assert_eq!(*role_rx.borrow_and_update(), PodRole::Leader);

    let hook: Arc<dyn Hook> = Arc::new(ShellHook::new("/bin/sleep", vec!["3600".to_string()]));
    let lifecycle = Lifecycle::spawn(hook, registry.clone());

    let snapshot = ClusterSnapshot {
        members: vec![registry.descriptor().await],
        dependencies: Default::default(),
    };
    let state = lifecycle.on(snapshot).await.expect("configure should succeed");
    assert_eq!(state, ProcessState::Running);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.descriptor().await.process, ProcessState::Running);
}
