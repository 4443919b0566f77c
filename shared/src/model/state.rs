use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of the persistent `state` node (§3): the leader's summary of the
/// last reconfiguration attempt, independent of the `hash` node which only
/// moves forward on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterState {
    pub last_reconfig_at: DateTime<Utc>,
    pub pod_count: usize,
    pub ok: bool,
}
