//! etcd-backed `CoordinationClient`. Leases model ZK ephemeral nodes
//! (the bound key disappears when the lease expires or is revoked); a
//! key's `create_revision` — already strictly increasing per key — models
//! the ZK sequence number, so no client-side counter is needed.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, GetOptions, PutOptions, Txn, TxnOp, WatchOptions,
};
use tokio::sync::{broadcast, oneshot};
use tokio::time::sleep;

use super::{CoordError, CoordinationClient, NodeData, SessionEvent, WatchHandle};

const SESSION_CHANNEL_CAPACITY: usize = 32;
/// Consecutive failed keep-alives tolerated before a lease's session is
/// declared `LOST` (§4.1: suspension is transient, loss is mandatory).
const KEEP_ALIVE_FAILURE_BUDGET: u32 = 3;

pub struct EtcdCoordinationClient {
    client: Client,
    session_ttl_secs: i64,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl EtcdCoordinationClient {
    pub async fn connect(endpoints: &[String], session_timeout_secs: u64) -> Result<Self, CoordError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| CoordError::Unreachable(e.to_string()))?;

        let (session_tx, _rx) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        let _ = session_tx.send(SessionEvent::Connected);

        Ok(Self {
            client,
            session_ttl_secs: session_timeout_secs.max(1) as i64,
            session_tx,
        })
    }

    /// Grants a lease bound to the agent's session TTL and starts the
    /// background keep-alive loop that keeps the ephemeral node alive.
    async fn grant_session_lease(&self) -> Result<i64, CoordError> {
        let mut client = self.client.clone();
        let lease = client
            .lease_grant(self.session_ttl_secs, None)
            .await
            .map_err(transient)?;
        let lease_id = lease.id();
        self.spawn_keep_alive(lease_id);
        Ok(lease_id)
    }

    fn spawn_keep_alive(&self, lease_id: i64) {
        let mut client = self.client.clone();
        let session_tx = self.session_tx.clone();
        let ttl = self.session_ttl_secs.max(1) as u64;

        tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                sleep(Duration::from_secs(ttl / 3 + 1)).await;

                let outcome = async {
                    let (mut keeper, mut stream) = client.lease_keep_alive(lease_id).await?;
                    keeper.keep_alive().await?;
                    stream.message().await
                }
                .await;

                match outcome {
                    Ok(Some(_)) => {
                        consecutive_failures = 0;
                    }
                    Ok(None) | Err(_) => {
                        consecutive_failures += 1;
                        let _ = session_tx.send(SessionEvent::Suspended);
                        if consecutive_failures >= KEEP_ALIVE_FAILURE_BUDGET {
                            let _ = session_tx.send(SessionEvent::Lost);
                            return;
                        }
                    }
                }
            }
        });
    }

    async fn arm_watch(&self, key: String, prefix: bool) -> Result<WatchHandle, CoordError> {
        let mut client = self.client.clone();
        let options = prefix.then(|| WatchOptions::new().with_prefix());
        let (_watcher, mut stream) = client.watch(key, options).await.map_err(transient)?;

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // Fires once on the first event; the watcher (and its server-side
            // registration) is dropped afterward, per ZK single-fire semantics.
            if let Ok(Some(_resp)) = stream.message().await {
                let _ = tx.send(());
            }
        });
        Ok(WatchHandle(rx))
    }
}

#[async_trait]
impl CoordinationClient for EtcdCoordinationClient {
    async fn create_ephemeral_sequential(
        &self,
        path_prefix: &str,
        data: Vec<u8>,
    ) -> Result<(String, i64), CoordError> {
        let lease_id = self.grant_session_lease().await?;
        let key = format!("{path_prefix}{lease_id}");

        let mut client = self.client.clone();
        client
            .put(key.clone(), data, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .map_err(transient)?;

        let resp = client.get(key.clone(), None).await.map_err(transient)?;
        let seq = resp
            .kvs()
            .first()
            .map(|kv| kv.create_revision())
            .ok_or_else(|| CoordError::Transient("node vanished immediately after creation".into()))?;

        Ok((key, seq))
    }

    async fn create_persistent(
        &self,
        path: &str,
        data: Vec<u8>,
        if_absent: bool,
    ) -> Result<(), CoordError> {
        let mut client = self.client.clone();
        if if_absent {
            let txn = Txn::new()
                .when(vec![Compare::create_revision(path, CompareOp::Equal, 0)])
                .and_then(vec![TxnOp::put(path, data, None)]);
            client.txn(txn).await.map_err(transient)?;
        } else {
            client.put(path, data, None).await.map_err(transient)?;
        }
        Ok(())
    }

    async fn set(&self, path: &str, data: Vec<u8>) -> Result<(), CoordError> {
        let mut client = self.client.clone();
        client.put(path, data, None).await.map_err(transient)?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<NodeData>, CoordError> {
        let mut client = self.client.clone();
        let resp = client.get(path, None).await.map_err(transient)?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| (kv.value().to_vec(), kv.version())))
    }

    async fn delete(&self, path: &str) -> Result<(), CoordError> {
        let mut client = self.client.clone();
        client.delete(path, None).await.map_err(transient)?;
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, WatchHandle), CoordError> {
        let mut client = self.client.clone();
        let resp = client
            .get(path, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(transient)?;

        let children = resp
            .kvs()
            .iter()
            .filter_map(|kv| kv.key_str().ok())
            .map(|k| k.trim_start_matches(path).trim_start_matches('/').to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let watch = self.arm_watch(path.to_string(), true).await?;
        Ok((children, watch))
    }

    async fn exists(&self, path: &str) -> Result<(bool, WatchHandle), CoordError> {
        let mut client = self.client.clone();
        let resp = client.get(path, None).await.map_err(transient)?;
        let exists = !resp.kvs().is_empty();

        let watch = self.arm_watch(path.to_string(), false).await?;
        Ok((exists, watch))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}

fn transient(err: impl fmt::Display) -> CoordError {
    CoordError::Transient(err.to_string())
}
