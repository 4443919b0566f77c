//! Leader Lock (C4, §4.4): sequential-ephemeral election. The lowest `seq`
//! under the lock path is leader; every other pod watches only its
//! immediate predecessor and promotes itself on that watch firing with an
//! empty predecessor — never on a timer.

use std::sync::Arc;

use shared::model::PodRole;
use shared::paths;
use tokio::sync::watch;

use crate::coordination::{CoordError, CoordinationClient};

pub struct Election {
    client: Arc<dyn CoordinationClient>,
    cluster: String,
}

impl Election {
    pub fn new(client: Arc<dyn CoordinationClient>, cluster: String) -> Self {
        Self { client, cluster }
    }

    /// Creates this pod's lock node and drives the election loop, publishing
    /// role transitions on `role_tx`. Returns once leadership is won; the
    /// agent is expected to rebuild from cold on session loss (§5) rather
    /// than have this loop watch for demotion.
    pub async fn run(&self, role_tx: &watch::Sender<PodRole>) -> Result<(), CoordError> {
        let prefix = paths::lock_node_prefix(&self.cluster);
        let (_my_path, my_seq) = self
            .client
            .create_ephemeral_sequential(&prefix, Vec::new())
            .await?;

        loop {
            let (children, _children_watch) =
                self.client.children(&paths::lock_dir(&self.cluster)).await?;

            let mut predecessor_seq = None;
            for name in &children {
                if let Some(seq) = parse_seq(name) {
                    if seq < my_seq && predecessor_seq.map(|p| seq > p).unwrap_or(true) {
                        predecessor_seq = Some(seq);
                    }
                }
            }

            match predecessor_seq {
                None => {
                    tracing::info!(seq = my_seq, "won leader election");
                    let _ = role_tx.send(PodRole::Leader);
                    return Ok(());
                }
                Some(seq) => {
                    let _ = role_tx.send(PodRole::Follower);
                    let pred_path = format!("{prefix}{seq}");
                    let (exists, watch) = self.client.exists(&pred_path).await?;
                    if exists {
                        tracing::debug!(seq, "watching immediate predecessor");
                        watch.changed().await;
                    }
                }
            }
        }
    }
}

/// Lock node names look like `n-<seq>`; the sequence is always the final
/// `-`-delimited segment since `lock_node_prefix` never embeds a dash itself.
fn parse_seq(name: &str) -> Option<i64> {
    name.rsplit('-').next()?.parse().ok()
}
