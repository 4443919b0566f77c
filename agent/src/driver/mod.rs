//! Reconfiguration Driver (C6, §4.6), leader-only: orchestrates the
//! `check → off → on → commit` sweep over HTTP and owns the cluster hash.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use shared::api::{ClusterSnapshot, StateResponse};
use shared::hash::snapshot_hash;
use shared::model::{ClusterState, PodDescriptor, ProcessState};
use shared::paths;

use crate::coordination::CoordinationClient;
use crate::errors::AgentError;

const PEER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Driver {
    client: Arc<dyn CoordinationClient>,
    cluster: String,
    http: reqwest::Client,
    damper: Duration,
    sequential: bool,
}

impl Driver {
    pub fn new(client: Arc<dyn CoordinationClient>, cluster: String, damper: Duration, sequential: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            client,
            cluster,
            http,
            damper,
            sequential,
        }
    }

    /// Consumes damped sweep requests from the watcher until the channel
    /// closes (session loss) or `is_leader` reports the lock was dropped
    /// (§4.6: "if the leader loses its lock mid-sweep, it aborts").
    pub async fn run(
        self: Arc<Self>,
        mut snapshots: tokio::sync::mpsc::Receiver<ClusterSnapshot>,
        is_leader: Arc<dyn Fn() -> bool + Send + Sync>,
    ) {
        while let Some(snapshot) = snapshots.recv().await {
            if !is_leader() {
                tracing::info!("lock lost before sweep could start, aborting");
                return;
            }
            self.clone().attempt(snapshot, is_leader.clone()).await;
        }
    }

    async fn attempt(self: Arc<Self>, snapshot: ClusterSnapshot, is_leader: Arc<dyn Fn() -> bool + Send + Sync>) {
        match self.sweep(&snapshot, &is_leader).await {
            Ok(()) => tracing::info!(cluster = %self.cluster, "sweep committed"),
            Err(err) => {
                tracing::warn!(error = %err, cluster = %self.cluster, "sweep failed, retrying after damper");
                self.schedule_retry(snapshot, is_leader);
            }
        }
    }

    fn schedule_retry(self: Arc<Self>, snapshot: ClusterSnapshot, is_leader: Arc<dyn Fn() -> bool + Send + Sync>) {
        let damper = self.damper;
        tokio::spawn(async move {
            tokio::time::sleep(damper).await;
            if !is_leader() {
                return;
            }
            self.attempt(snapshot, is_leader).await;
        });
    }

    /// Runs all four phases against the Phase-A snapshot; membership
    /// observed mid-sweep is never re-read (§4.6).
    async fn sweep(
        &self,
        snapshot: &ClusterSnapshot,
        is_leader: &Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Result<(), AgentError> {
        self.probe(snapshot).await?;
        self.teardown(snapshot).await?;
        if !is_leader() {
            return Err(AgentError::LockLost);
        }
        self.configure(snapshot).await?;
        self.commit(snapshot).await
    }

    async fn probe(&self, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        for member in active_members(&snapshot.members) {
            let status = self.post(member, "check", Some(snapshot)).await?;
            if status == StatusCode::NOT_ACCEPTABLE {
                return Err(AgentError::HookRejection(format!(
                    "{} rejected the proposed configuration",
                    member.node
                )));
            }
            if !status.is_success() && status != StatusCode::GONE {
                return Err(AgentError::PeerUnreachable(format!(
                    "{} returned {} during check",
                    member.node, status
                )));
            }
        }
        Ok(())
    }

    async fn teardown(&self, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        let active = active_members(&snapshot.members);
        if self.sequential {
            for member in active {
                self.stop_one(member).await?;
            }
        } else {
            let results = futures_util::future::join_all(active.iter().map(|m| self.stop_one(m))).await;
            for result in results {
                result?;
            }
        }
        Ok(())
    }

    async fn stop_one(&self, member: &PodDescriptor) -> Result<(), AgentError> {
        let status = self.post(member, "off", None).await?;
        if status.is_success() || status == StatusCode::GONE {
            Ok(())
        } else {
            Err(AgentError::PeerUnreachable(format!(
                "{} returned {} during teardown",
                member.node, status
            )))
        }
    }

    async fn configure(&self, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        let active = active_members(&snapshot.members);
        if self.sequential {
            for member in active {
                self.configure_one(member, snapshot).await?;
            }
        } else {
            let results =
                futures_util::future::join_all(active.iter().map(|m| self.configure_one(m, snapshot))).await;
            for result in results {
                result?;
            }
        }
        Ok(())
    }

    async fn configure_one(&self, member: &PodDescriptor, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        let response = self
            .http_post(member, "on", Some(snapshot))
            .await?;
        let status = response.status();
        if status == StatusCode::GONE {
            return Ok(());
        }
        if status == StatusCode::NOT_ACCEPTABLE {
            return Err(AgentError::HookRejection(format!(
                "{} rejected configuration",
                member.node
            )));
        }
        if !status.is_success() {
            return Err(AgentError::PeerUnreachable(format!(
                "{} returned {} during configure", member.node, status
            )));
        }
        let body: StateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::PeerUnreachable(format!("{} sent a malformed body: {e}", member.node)))?;
        if body.state != ProcessState::Running {
            return Err(AgentError::PeerUnreachable(format!(
                "{} did not reach running after configure",
                member.node
            )));
        }
        Ok(())
    }

    async fn commit(&self, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        let hash = snapshot_hash(&snapshot.members, &snapshot.dependencies);
        self.client
            .set(&paths::hash_node(&self.cluster), hash.into_bytes())
            .await
            .map_err(AgentError::from)?;

        let state = ClusterState {
            last_reconfig_at: chrono::Utc::now(),
            pod_count: snapshot.members.len(),
            ok: true,
        };
        let payload = serde_json::to_vec(&state).expect("ClusterState always serializes");
        self.client
            .set(&paths::state_node(&self.cluster), payload)
            .await
            .map_err(AgentError::from)
    }

    async fn post(
        &self,
        member: &PodDescriptor,
        path: &str,
        body: Option<&ClusterSnapshot>,
    ) -> Result<StatusCode, AgentError> {
        Ok(self.http_post(member, path, body).await?.status())
    }

    async fn http_post(
        &self,
        member: &PodDescriptor,
        path: &str,
        body: Option<&ClusterSnapshot>,
    ) -> Result<reqwest::Response, AgentError> {
        let port = member
            .control_port()
            .ok_or_else(|| AgentError::PeerUnreachable(format!("{} has no control port", member.node)))?;
        let url = format!("http://{}:{port}/control/{path}", member.ip);
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| AgentError::PeerUnreachable(format!("{} unreachable: {e}", member.node)))
    }
}

/// Dead/failed pods do not participate in a sweep and do not block it
/// (§4.6; the universal `HTTP 410` rule of §6 makes this symmetric with
/// what an unexpectedly-idling peer would report anyway).
fn active_members(members: &[PodDescriptor]) -> Vec<&PodDescriptor> {
    members
        .iter()
        .filter(|m| !matches!(m.process, ProcessState::Dead | ProcessState::Failed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_and_failed_pods_are_excluded_from_the_active_set() {
        let mut running = PodDescriptor::default();
        running.process = ProcessState::Running;
        let mut dead = PodDescriptor::default();
        dead.process = ProcessState::Dead;
        let mut failed = PodDescriptor::default();
        failed.process = ProcessState::Failed;

        let members = vec![running.clone(), dead, failed];
        let active = active_members(&members);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].uuid, running.uuid);
    }
}
