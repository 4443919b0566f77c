//! Cluster Watcher (C5, §4.5), leader-only: tracks membership and
//! dependency hashes, applies the damper, and emits damped sweep requests
//! to the Reconfiguration Driver (C6).

mod damper;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use shared::api::ClusterSnapshot;
use shared::hash::snapshot_hash;
use shared::model::PodDescriptor;
use shared::paths;

use crate::coordination::{CoordError, CoordinationClient};
use damper::Damper;

pub struct ClusterWatcher {
    client: Arc<dyn CoordinationClient>,
    cluster: String,
    dependencies: Vec<String>,
    damper: Duration,
}

impl ClusterWatcher {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        cluster: String,
        dependencies: Vec<String>,
        damper: Duration,
    ) -> Self {
        Self {
            client,
            cluster,
            dependencies,
            damper,
        }
    }

    /// Runs until the coordination session is lost. Each damped, changed
    /// snapshot is sent on `sweep_tx`; the driver consumes at its own pace.
    pub async fn run(&self, sweep_tx: mpsc::Sender<ClusterSnapshot>) -> Result<(), CoordError> {
        let pods_dir = paths::pods_dir(&self.cluster);
        let mut dep_hashes: BTreeMap<String, String> = BTreeMap::new();
        let mut last_sweep_hash: Option<String> = None;
        let mut damper = Damper::new(self.damper);

        let (signal_tx, mut signal_rx) = mpsc::channel::<()>(32);
        spawn_children_watch(self.client.clone(), pods_dir.clone(), signal_tx.clone());
        for dep in &self.dependencies {
            spawn_dependency_watch(self.client.clone(), dep.clone(), signal_tx.clone());
        }

        // A watch only ever delivers *future* events; without this, a
        // cluster that is already fully formed by the time leadership is
        // won would never see an event and so would never sweep (S1, S2).
        // Arming the damper immediately sweeps whatever membership already
        // exists the moment this leader starts watching.
        damper.signal();

        loop {
            tokio::select! {
                signal = signal_rx.recv() => {
                    if signal.is_none() {
                        return Ok(());
                    }
                    tracing::debug!("membership or dependency signal, resetting damper");
                    damper.signal();
                }
                _ = damper.wait(), if damper.armed() => {
                    damper.disarm();
                    self.maybe_sweep(&pods_dir, &mut dep_hashes, &mut last_sweep_hash, &sweep_tx).await?;
                }
            }
        }
    }

    async fn maybe_sweep(
        &self,
        pods_dir: &str,
        dep_hashes: &mut BTreeMap<String, String>,
        last_sweep_hash: &mut Option<String>,
        sweep_tx: &mpsc::Sender<ClusterSnapshot>,
    ) -> Result<(), CoordError> {
        let members = self.read_members(pods_dir).await?;
        self.read_dependency_hashes(dep_hashes).await?;

        let current_hash = snapshot_hash(&members, dep_hashes);
        if last_sweep_hash.as_deref() == Some(current_hash.as_str()) {
            tracing::debug!("snapshot unchanged after damper, suppressing sweep");
            return Ok(());
        }
        *last_sweep_hash = Some(current_hash);

        let snapshot = ClusterSnapshot {
            members,
            dependencies: dep_hashes.clone(),
        };
        if sweep_tx.send(snapshot).await.is_err() {
            tracing::debug!("driver channel closed, watcher stopping");
        }
        Ok(())
    }

    async fn read_members(&self, pods_dir: &str) -> Result<Vec<PodDescriptor>, CoordError> {
        let (children, _watch) = self.client.children(pods_dir).await?;
        let mut members = Vec::with_capacity(children.len());
        for child in children {
            let path = format!("{pods_dir}/{child}");
            if let Some((data, _version)) = self.client.get(&path).await? {
                match serde_json::from_slice::<PodDescriptor>(&data) {
                    Ok(descriptor) => members.push(descriptor),
                    Err(err) => tracing::warn!(error = %err, %path, "malformed pod descriptor, skipping"),
                }
            }
        }
        members.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(members)
    }

    async fn read_dependency_hashes(
        &self,
        dep_hashes: &mut BTreeMap<String, String>,
    ) -> Result<(), CoordError> {
        for dep in &self.dependencies {
            if let Some((data, _version)) = self.client.get(&paths::hash_node(dep)).await? {
                dep_hashes.insert(dep.clone(), String::from_utf8_lossy(&data).to_string());
            }
        }
        Ok(())
    }
}

fn spawn_children_watch(client: Arc<dyn CoordinationClient>, path: String, signal_tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        loop {
            match client.children(&path).await {
                Ok((_, watch)) => {
                    watch.changed().await;
                    if signal_tx.send(()).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, %path, "children watch failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
}

fn spawn_dependency_watch(
    client: Arc<dyn CoordinationClient>,
    dep_cluster: String,
    signal_tx: mpsc::Sender<()>,
) {
    let path = paths::hash_node(&dep_cluster);
    tokio::spawn(async move {
        loop {
            match client.exists(&path).await {
                Ok((_, watch)) => {
                    watch.changed().await;
                    if signal_tx.send(()).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, dep = %dep_cluster, "dependency watch failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
}
