//! Wire data model for the pod agent: the descriptor published to the
//! coordination service (§3) and the leader's in-memory cluster view.

mod cluster;
mod descriptor;
mod state;

pub use cluster::{Cluster, RegisteredPod};
pub use descriptor::{PodDescriptor, PodRole, ProcessState};
pub use state::ClusterState;
