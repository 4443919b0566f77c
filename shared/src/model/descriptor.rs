use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pod descriptor (§3): the JSON payload published at the registration node.
///
/// Stable across reconnects except for `process`/`state`, which the owning
/// pod rewrites locally (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodDescriptor {
    /// Host identifier provided by the binding.
    pub node: String,
    /// Orchestrator-assigned task id.
    pub task: String,
    /// Internal address reachable by peers.
    pub ip: String,
    /// Externally reachable address (may equal `ip`).
    pub public: String,
    /// Container-exposed TCP port -> host-remapped TCP port.
    pub ports: BTreeMap<u16, u16>,
    /// The control-port key within `ports`, as its string form.
    pub port: String,
    /// Orchestrator application name.
    pub application: String,
    /// Fully qualified cluster key `namespace.cluster_name`.
    pub cluster: String,
    pub process: ProcessState,
    pub state: PodRole,
    /// Stable random id generated once at process start.
    pub uuid: Uuid,
}

/// §3 invariant 5: `stopped -> running -> (dead|failed)`, monotonic per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Running,
    Dead,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodRole {
    Leader,
    Follower,
}

impl PodDescriptor {
    /// Parses the control port out of `ports` using the `port` key.
    pub fn control_port(&self) -> Option<u16> {
        let key: u16 = self.port.parse().ok()?;
        self.ports.get(&key).copied()
    }
}

impl Default for PodDescriptor {
    fn default() -> Self {
        let mut ports = BTreeMap::new();
        ports.insert(8080, 31000);
        Self {
            node: "host-1".to_string(),
            task: "task-0".to_string(),
            ip: "10.0.0.1".to_string(),
            public: "10.0.0.1".to_string(),
            ports,
            port: "8080".to_string(),
            application: "demo".to_string(),
            cluster: "marathon.demo".to_string(),
            process: ProcessState::Stopped,
            state: PodRole::Follower,
            uuid: Uuid::new_v4(),
        }
    }
}
