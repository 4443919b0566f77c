//! Registry (C3, §4.3): publishes the pod descriptor as an ephemeral
//! sequential node and rewrites its payload on local mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use shared::model::PodDescriptor;
use shared::paths;

use crate::coordination::{CoordError, CoordinationClient};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_FACTOR: u32 = 2;
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Registration {
    pub path: String,
    pub seq: i64,
}

/// Owns the pod's registration node. All descriptor mutation goes through
/// `update`, which rewrites the node's payload in place (§4.3).
pub struct Registry {
    client: Arc<dyn CoordinationClient>,
    descriptor: Mutex<PodDescriptor>,
    registration: Mutex<Option<Registration>>,
}

impl Registry {
    pub fn new(client: Arc<dyn CoordinationClient>, descriptor: PodDescriptor) -> Self {
        Self {
            client,
            descriptor: Mutex::new(descriptor),
            registration: Mutex::new(None),
        }
    }

    /// Creates the ephemeral sequential registration node, retrying transient
    /// coordination errors with exponential back-off. Exhausting the retry
    /// budget is fatal (§4.3).
    pub async fn register(&self, retries: u16) -> Result<Registration, CoordError> {
        let descriptor = self.descriptor.lock().await.clone();
        let payload = serde_json::to_vec(&descriptor).expect("descriptor always serializes");
        let prefix = paths::pod_node_prefix(&descriptor.cluster);

        let mut backoff = BACKOFF_BASE;
        let mut last_err = CoordError::Fatal("registration retries exhausted".to_string());
        for attempt in 1..=retries.max(1) {
            match self
                .client
                .create_ephemeral_sequential(&prefix, payload.clone())
                .await
            {
                Ok((path, seq)) => {
                    let registration = Registration { path, seq };
                    *self.registration.lock().await = Some(registration.clone());
                    return Ok(registration);
                }
                Err(CoordError::Transient(msg)) => {
                    tracing::warn!(attempt, error = %msg, "registration attempt failed, retrying");
                    last_err = CoordError::Transient(msg);
                    sleep(backoff).await;
                    backoff = (backoff * BACKOFF_FACTOR).min(BACKOFF_CAP);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    /// Applies `mutate` to the local descriptor and rewrites the registration
    /// node's payload to match (e.g. after a `process`/`state` transition).
    pub async fn update<F>(&self, mutate: F) -> Result<(), CoordError>
    where
        F: FnOnce(&mut PodDescriptor),
    {
        let mut descriptor = self.descriptor.lock().await;
        mutate(&mut descriptor);
        let payload = serde_json::to_vec(&*descriptor).expect("descriptor always serializes");

        let path = {
            let registration = self.registration.lock().await;
            registration
                .as_ref()
                .map(|r| r.path.clone())
                .ok_or_else(|| CoordError::Fatal("update before registration".to_string()))?
        };

        self.client.set(&path, payload).await
    }

    pub async fn descriptor(&self) -> PodDescriptor {
        self.descriptor.lock().await.clone()
    }

    pub async fn seq(&self) -> Option<i64> {
        self.registration.lock().await.as_ref().map(|r| r.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::memory::MemoryCoordinationClient;

    fn descriptor() -> PodDescriptor {
        let mut d = PodDescriptor::default();
        d.cluster = "marathon.demo".to_string();
        d
    }

    #[tokio::test]
    async fn register_assigns_a_sequence_number() {
        let client: Arc<dyn CoordinationClient> = Arc::new(MemoryCoordinationClient::new());
        let registry = Registry::new(client.clone(), descriptor());
        let registration = registry.register(3).await.unwrap();
        assert!(registration.seq > 0);
        assert_eq!(registry.seq().await, Some(registration.seq));
    }

    #[tokio::test]
    async fn update_rewrites_the_registration_node() {
        let client: Arc<dyn CoordinationClient> = Arc::new(MemoryCoordinationClient::new());
        let registry = Registry::new(client.clone(), descriptor());
        let registration = registry.register(1).await.unwrap();

        registry
            .update(|d| d.process = shared::model::ProcessState::Running)
            .await
            .unwrap();

        let (data, _) = client.get(&registration.path).await.unwrap().unwrap();
        let stored: PodDescriptor = serde_json::from_slice(&data).unwrap();
        assert_eq!(stored.process, shared::model::ProcessState::Running);
    }

    #[tokio::test]
    async fn update_before_register_is_fatal() {
        let client: Arc<dyn CoordinationClient> = Arc::new(MemoryCoordinationClient::new());
        let registry = Registry::new(client, descriptor());
        let result = registry.update(|d| d.process = shared::model::ProcessState::Dead).await;
        assert!(result.is_err());
    }
}
