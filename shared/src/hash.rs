//! Cluster snapshot fingerprinting (§3 invariant 4, §8 property 2):
//! `hash = sha1(sorted(descriptors) || sorted(dep_hashes))`.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use crate::model::PodDescriptor;

/// Computes the fingerprint of a committed member set + dependency snapshot.
///
/// Descriptors are sorted by `uuid` (stable regardless of `seq`, which may
/// change across reconnects per §3 invariant 3) before hashing so that two
/// snapshots with the same members in different registration order hash
/// identically.
pub fn snapshot_hash(descriptors: &[PodDescriptor], dep_hashes: &BTreeMap<String, String>) -> String {
    let mut sorted: Vec<&PodDescriptor> = descriptors.iter().collect();
    sorted.sort_by_key(|d| d.uuid);

    let mut hasher = Sha1::new();
    for d in sorted {
        // serde_json::to_string on a well-formed descriptor cannot fail.
        let encoded = serde_json::to_string(d).unwrap_or_default();
        hasher.update(encoded.as_bytes());
        hasher.update(b"\0");
    }
    // BTreeMap iterates in key order already, which is the "sorted" dep view.
    for (cluster, dep_hash) in dep_hashes {
        hasher.update(cluster.as_bytes());
        hasher.update(b"=");
        hasher.update(dep_hash.as_bytes());
        hasher.update(b"\0");
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_regardless_of_input_order() {
        let mut a = PodDescriptor::default();
        a.uuid = uuid::Uuid::nil();
        let mut b = PodDescriptor::default();
        b.uuid = uuid::Uuid::max();

        let h1 = snapshot_hash(&[a.clone(), b.clone()], &BTreeMap::new());
        let h2 = snapshot_hash(&[b, a], &BTreeMap::new());
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_when_dependency_hash_changes() {
        let descriptors = [PodDescriptor::default()];
        let mut deps = BTreeMap::new();
        deps.insert("marathon.a".to_string(), "HA0".to_string());
        let h0 = snapshot_hash(&descriptors, &deps);

        deps.insert("marathon.a".to_string(), "HA1".to_string());
        let h1 = snapshot_hash(&descriptors, &deps);

        assert_ne!(h0, h1);
    }
}
