use std::collections::BTreeMap;

use super::descriptor::PodDescriptor;
use crate::api::ClusterSnapshot;

/// A pod descriptor as seen by the leader, tagged with the sequence number
/// assigned by the registry (§3 invariant 2: `index = seq`, unique and
/// stable for the life of the session).
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredPod {
    pub seq: i64,
    pub descriptor: PodDescriptor,
}

/// The set of live pods sharing a `cluster` key, as maintained by the
/// leader's Cluster Watcher (C5).
#[derive(Debug, Clone, Default)]
pub struct Cluster {
    /// Always kept sorted by `seq` (ascending).
    pods: Vec<RegisteredPod>,
    /// Dependency cluster key -> last observed hash of that cluster.
    dependencies: BTreeMap<String, String>,
}

impl Cluster {
    pub fn new(mut pods: Vec<RegisteredPod>, dependencies: BTreeMap<String, String>) -> Self {
        pods.sort_by_key(|p| p.seq);
        Self { pods, dependencies }
    }

    pub fn size(&self) -> usize {
        self.pods.len()
    }

    /// Pods ordered by `seq`, as required by the Driver (C6) for
    /// sequential teardown/configure ordering.
    pub fn pods(&self) -> &[RegisteredPod] {
        &self.pods
    }

    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    /// Pods exposing the given container port, in `seq` order.
    pub fn grep(&self, container_port: u16) -> Vec<&RegisteredPod> {
        self.pods
            .iter()
            .filter(|p| p.descriptor.ports.contains_key(&container_port))
            .collect()
    }

    /// Builds the hook-facing view from a Phase-A wire snapshot (§4.6, §4.7's
    /// `configure(cluster)`). The snapshot carries only descriptors, not the
    /// registry's `seq`, since `seq` is a leader-local bookkeeping detail
    /// (§3 invariant 2) that never needs to cross the wire: the snapshot's
    /// member order is already the leader's fixed Phase-A order, so the
    /// position within it stands in for `seq` here.
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        let pods = snapshot
            .members
            .iter()
            .enumerate()
            .map(|(i, descriptor)| RegisteredPod {
                seq: i as i64,
                descriptor: descriptor.clone(),
            })
            .collect();
        Self::new(pods, snapshot.dependencies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_snapshot_assigns_positional_seq_and_keeps_order() {
        let mut a = PodDescriptor::default();
        a.node = "a".to_string();
        let mut b = PodDescriptor::default();
        b.node = "b".to_string();

        let snapshot = ClusterSnapshot {
            members: vec![a, b],
            dependencies: BTreeMap::new(),
        };
        let cluster = Cluster::from_snapshot(&snapshot);

        assert_eq!(cluster.size(), 2);
        assert_eq!(cluster.pods()[0].seq, 0);
        assert_eq!(cluster.pods()[0].descriptor.node, "a");
        assert_eq!(cluster.pods()[1].seq, 1);
        assert_eq!(cluster.pods()[1].descriptor.node, "b");
    }

    #[test]
    fn grep_filters_by_exposed_container_port() {
        let mut exposing = PodDescriptor::default();
        exposing.ports.insert(9090, 32000);
        let not_exposing = PodDescriptor::default();

        let pods = vec![
            RegisteredPod { seq: 0, descriptor: exposing.clone() },
            RegisteredPod { seq: 1, descriptor: not_exposing },
        ];
        let cluster = Cluster::new(pods, BTreeMap::new());

        let matches = cluster.grep(9090);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].descriptor.uuid, exposing.uuid);
    }
}
