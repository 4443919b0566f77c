use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use pod_agent::coordination::{memory::MemoryCoordinationClient, CoordinationClient};
use shared::model::PodDescriptor;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pod_agent=debug")
        .with_test_writer()
        .try_init();
}

pub fn shared_store() -> (Arc<dyn CoordinationClient>, MemoryCoordinationClient) {
    let memory = MemoryCoordinationClient::new();
    let client: Arc<dyn CoordinationClient> = Arc::new(memory.clone());
    (client, memory)
}

/// A pod descriptor with a fresh `uuid`, pointed at `port` on `127.0.0.1`
/// so the Driver's peer HTTP calls can reach a real (or mocked) listener.
pub fn descriptor(cluster: &str, port: u16) -> PodDescriptor {
    let mut ports = BTreeMap::new();
    ports.insert(8080u16, port);
    PodDescriptor {
        node: format!("host-{}", Uuid::new_v4()),
        task: "task-0".to_string(),
        ip: "127.0.0.1".to_string(),
        public: "127.0.0.1".to_string(),
        ports,
        port: "8080".to_string(),
        application: "demo".to_string(),
        cluster: cluster.to_string(),
        process: shared::model::ProcessState::Running,
        state: shared::model::PodRole::Follower,
        uuid: Uuid::new_v4(),
    }
}
