//! Deterministic in-process `CoordinationClient` double. No network, no
//! background tasks beyond the ones the test explicitly drives — ephemeral
//! nodes live until `drop_session` (or the whole client) is dropped rather
//! than on a lease timer, so scenario tests control liveness directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use super::{CoordError, CoordinationClient, NodeData, SessionEvent, WatchHandle};

struct Node {
    data: Vec<u8>,
    version: i64,
    create_revision: i64,
}

struct Watchers {
    /// Watchers on an exact path.
    exact: BTreeMap<String, Vec<oneshot::Sender<()>>>,
    /// Watchers on anything under a prefix (used by `children`).
    prefix: BTreeMap<String, Vec<oneshot::Sender<()>>>,
}

struct Inner {
    nodes: BTreeMap<String, Node>,
    watchers: Watchers,
    revision: AtomicI64,
    session_tx: broadcast::Sender<SessionEvent>,
}

/// A shared in-memory store standing in for an etcd cluster. Clone to hand
/// multiple agents under test a view of the same store.
#[derive(Clone)]
pub struct MemoryCoordinationClient {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryCoordinationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationClient {
    pub fn new() -> Self {
        let (session_tx, _rx) = broadcast::channel(32);
        let _ = session_tx.send(SessionEvent::Connected);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes: BTreeMap::new(),
                watchers: Watchers {
                    exact: BTreeMap::new(),
                    prefix: BTreeMap::new(),
                },
                revision: AtomicI64::new(1),
                session_tx,
            })),
        }
    }

    /// Deletes every ephemeral node this handle created and fires watches,
    /// simulating the store reaping a lease after session loss.
    pub fn drop_session(&self, paths: &[String]) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for path in paths {
            inner.nodes.remove(path);
        }
        notify_all(&mut inner, paths);
        let _ = inner.session_tx.send(SessionEvent::Lost);
    }

    pub fn suspend(&self) {
        let inner = self.inner.lock().expect("memory store poisoned");
        let _ = inner.session_tx.send(SessionEvent::Suspended);
    }

    pub fn reconnect(&self) {
        let inner = self.inner.lock().expect("memory store poisoned");
        let _ = inner.session_tx.send(SessionEvent::Connected);
    }
}

fn notify_all(inner: &mut Inner, touched: &[String]) {
    for path in touched {
        if let Some(senders) = inner.watchers.exact.remove(path) {
            for tx in senders {
                let _ = tx.send(());
            }
        }
        let fired_prefixes: Vec<String> = inner
            .watchers
            .prefix
            .keys()
            .filter(|prefix| path.starts_with(prefix.as_str()))
            .cloned()
            .collect();
        for prefix in fired_prefixes {
            if let Some(senders) = inner.watchers.prefix.remove(&prefix) {
                for tx in senders {
                    let _ = tx.send(());
                }
            }
        }
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinationClient {
    async fn create_ephemeral_sequential(
        &self,
        path_prefix: &str,
        data: Vec<u8>,
    ) -> Result<(String, i64), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let revision = inner.revision.fetch_add(1, Ordering::SeqCst);
        let key = format!("{path_prefix}{revision}");
        inner.nodes.insert(
            key.clone(),
            Node {
                data,
                version: 1,
                create_revision: revision,
            },
        );
        let touched = vec![key.clone()];
        notify_all(&mut inner, &touched);
        Ok((key, revision))
    }

    async fn create_persistent(
        &self,
        path: &str,
        data: Vec<u8>,
        if_absent: bool,
    ) -> Result<(), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if if_absent && inner.nodes.contains_key(path) {
            return Ok(());
        }
        let revision = inner.revision.fetch_add(1, Ordering::SeqCst);
        inner.nodes.insert(
            path.to_string(),
            Node {
                data,
                version: 1,
                create_revision: revision,
            },
        );
        let touched = vec![path.to_string()];
        notify_all(&mut inner, &touched);
        Ok(())
    }

    async fn set(&self, path: &str, data: Vec<u8>) -> Result<(), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        match inner.nodes.get_mut(path) {
            Some(node) => {
                node.data = data;
                node.version += 1;
            }
            None => {
                let revision = inner.revision.fetch_add(1, Ordering::SeqCst);
                inner.nodes.insert(
                    path.to_string(),
                    Node {
                        data,
                        version: 1,
                        create_revision: revision,
                    },
                );
            }
        }
        let touched = vec![path.to_string()];
        notify_all(&mut inner, &touched);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<NodeData>, CoordError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.nodes.get(path).map(|n| (n.data.clone(), n.version)))
    }

    async fn delete(&self, path: &str) -> Result<(), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.nodes.remove(path);
        let touched = vec![path.to_string()];
        notify_all(&mut inner, &touched);
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, WatchHandle), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let prefix = path.to_string();
        let children = inner
            .nodes
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|rest| !rest.is_empty())
            .collect();

        let (tx, rx) = oneshot::channel();
        inner.watchers.prefix.entry(prefix).or_default().push(tx);
        Ok((children, WatchHandle(rx)))
    }

    async fn exists(&self, path: &str) -> Result<(bool, WatchHandle), CoordError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let exists = inner.nodes.contains_key(path);

        let (tx, rx) = oneshot::channel();
        inner
            .watchers
            .exact
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok((exists, WatchHandle(rx)))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.session_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_nodes_receive_increasing_sequence_numbers() {
        let client = MemoryCoordinationClient::new();
        let (_, first) = client
            .create_ephemeral_sequential("/cluster/app/election/n_", b"a".to_vec())
            .await
            .unwrap();
        let (_, second) = client
            .create_ephemeral_sequential("/cluster/app/election/n_", b"b".to_vec())
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn children_watch_fires_on_new_sibling() {
        let client = MemoryCoordinationClient::new();
        let (_, watch) = client.children("/cluster/app/election/").await.unwrap();
        client
            .create_ephemeral_sequential("/cluster/app/election/n_", b"a".to_vec())
            .await
            .unwrap();
        watch.changed().await;
    }

    #[tokio::test]
    async fn drop_session_removes_ephemeral_nodes_and_fires_watch() {
        let client = MemoryCoordinationClient::new();
        let (key, _) = client
            .create_ephemeral_sequential("/cluster/app/election/n_", b"a".to_vec())
            .await
            .unwrap();
        let (_, watch) = client.exists(&key).await.unwrap();
        client.drop_session(&[key.clone()]);
        watch.changed().await;
        assert!(client.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn if_absent_create_is_a_noop_when_present() {
        let client = MemoryCoordinationClient::new();
        client
            .create_persistent("/cluster/app/config", b"one".to_vec(), true)
            .await
            .unwrap();
        client
            .create_persistent("/cluster/app/config", b"two".to_vec(), true)
            .await
            .unwrap();
        let (data, _) = client.get("/cluster/app/config").await.unwrap().unwrap();
        assert_eq!(data, b"one");
    }
}
