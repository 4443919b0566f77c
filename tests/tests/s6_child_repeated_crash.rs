//! S6 — a Piped hook with `checks=2` whose child exits nonzero three times
//! in a row should fail after the third exit and stop restarting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pod_agent::hook::{Hook, Launch};
use pod_agent::lifecycle::Lifecycle;
use pod_agent::registry::Registry;
use shared::api::ClusterSnapshot;
use shared::model::{Cluster, ProcessState};

/// Always exits with status 1, regardless of the snapshot it is handed.
struct AlwaysCrashes {
    checks: u32,
}

impl Hook for AlwaysCrashes {
    fn checks(&self) -> u32 {
        self.checks
    }

    fn owns_subprocess(&self) -> bool {
        true
    }

    fn check_every(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn configure(&self, _cluster: &Cluster) -> Result<Launch, String> {
        Ok(Launch {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "exit 1".to_string()],
            env: Default::default(),
        })
    }
}

#[tokio::test]
async fn three_nonzero_exits_exhaust_the_restart_budget() {
    let (client, _memory) = common::shared_store();
    let mut descriptor = shared::model::PodDescriptor::default();
    descriptor.cluster = "marathon.demo".to_string();

    let registry = Arc::new(Registry::new(client, descriptor));
    registry.register(1).await.unwrap();

    let hook: Arc<dyn Hook> = Arc::new(AlwaysCrashes { checks: 2 });
    let lifecycle = Lifecycle::spawn(hook, registry.clone());

    let snapshot = ClusterSnapshot {
        members: Vec::new(),
        dependencies: Default::default(),
    };
    lifecycle.on(snapshot).await.expect("first launch always succeeds");

    // Three exits: the restart budget (checks=2) tolerates the first two
    // restarts, then the third exit exhausts it.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(registry.descriptor().await.process, ProcessState::Failed);
}
