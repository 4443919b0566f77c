//! Coordination-service path builders (§3). Every component builds paths
//! through these functions so the layout stays consistent cluster-wide.

const ROOT: &str = "/ochopod/clusters";

pub fn cluster_root(cluster: &str) -> String {
    format!("{ROOT}/{cluster}")
}

/// Directory under which `Registry` (C3) creates ephemeral sequential
/// `pod-<seq>` nodes.
pub fn pods_dir(cluster: &str) -> String {
    format!("{}/pods", cluster_root(cluster))
}

/// Key prefix passed to `create_ephemeral_sequential` for a pod registration.
pub fn pod_node_prefix(cluster: &str) -> String {
    format!("{}/pod-", pods_dir(cluster))
}

/// Directory under which `Election` (C4) creates ephemeral sequential
/// lock nodes.
pub fn lock_dir(cluster: &str) -> String {
    format!("{}/lock", cluster_root(cluster))
}

pub fn lock_node_prefix(cluster: &str) -> String {
    format!("{}/n-", lock_dir(cluster))
}

/// Persistent node holding the last successful reconfiguration hash.
pub fn hash_node(cluster: &str) -> String {
    format!("{}/hash", cluster_root(cluster))
}

/// Persistent node holding `{ last_reconfig_at, pod_count, ok }`.
pub fn state_node(cluster: &str) -> String {
    format!("{}/state", cluster_root(cluster))
}
