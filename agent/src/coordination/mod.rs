//! Coordination Client (C1, §4.1): a thin facade over a ZooKeeper-like
//! hierarchical store offering ephemeral nodes, sequential nodes and
//! watches. `etcd_backend` is the real implementation (etcd leases model
//! ephemeral nodes, etcd creation revisions model ZK sequence numbers);
//! `memory` is a deterministic in-process double used by tests.

mod error;
mod etcd_backend;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use error::CoordError;
pub use etcd_backend::EtcdCoordinationClient;

use async_trait::async_trait;
use tokio::sync::oneshot;

/// Session lifecycle events (§4.1): suspension is transient, loss is
/// mandatory full restart of C3–C6 (§1, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Suspended,
    Lost,
}

/// Fires exactly once, the first time the watched path changes — callers
/// that want to keep watching re-register (ZK single-fire semantics, §4.1).
pub struct WatchHandle(pub(crate) oneshot::Receiver<()>);

impl WatchHandle {
    /// Resolves when the watch fires, or immediately if the watcher was
    /// dropped (e.g. session loss tore it down).
    pub async fn changed(self) {
        let _ = self.0.await;
    }
}

/// A node's payload and its store-assigned version (used for CAS-style
/// updates by callers that need them; the agent itself only ever does
/// blind overwrites via `set`).
pub type NodeData = (Vec<u8>, i64);

#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Creates an ephemeral, sequential node under `path_prefix` holding
    /// `data`. Returns the full assigned path and its sequence number
    /// (§4.1, §3 invariant 2).
    async fn create_ephemeral_sequential(
        &self,
        path_prefix: &str,
        data: Vec<u8>,
    ) -> Result<(String, i64), CoordError>;

    /// Creates a persistent node. If `if_absent` and the node already
    /// exists, this is a no-op rather than an error.
    async fn create_persistent(
        &self,
        path: &str,
        data: Vec<u8>,
        if_absent: bool,
    ) -> Result<(), CoordError>;

    /// Overwrites a node's payload.
    async fn set(&self, path: &str, data: Vec<u8>) -> Result<(), CoordError>;

    /// Reads a node's payload and version, or `None` if it doesn't exist.
    async fn get(&self, path: &str) -> Result<Option<NodeData>, CoordError>;

    async fn delete(&self, path: &str) -> Result<(), CoordError>;

    /// Lists immediate children of `path` and arms a one-shot watch for the
    /// next change to that child set.
    async fn children(&self, path: &str) -> Result<(Vec<String>, WatchHandle), CoordError>;

    /// Checks whether `path` exists and arms a one-shot watch for the next
    /// change (creation, deletion, or data change) at that path.
    async fn exists(&self, path: &str) -> Result<(bool, WatchHandle), CoordError>;

    /// A stream of session lifecycle transitions (§4.1).
    fn session_events(&self) -> tokio::sync::broadcast::Receiver<SessionEvent>;
}
