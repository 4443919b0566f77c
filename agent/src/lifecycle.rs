//! Local Lifecycle FSM (C7, §4.7): `IDLE -> CHECKING -> STOPPING ->
//! CONFIGURING -> RUNNING -> DEAD`, with `FAILED` reachable from
//! `CONFIGURING` on hook exception and from `RUNNING` on repeated
//! subprocess failure. A single worker task owns the state exclusively and
//! serializes every transition, mirroring the teacher's single-worker
//! reconciliation loop.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use shared::api::ClusterSnapshot;
use shared::model::{Cluster, PodRole, ProcessState};

use crate::errors::AgentError;
use crate::hook::{Hook, Launch};
use crate::registry::Registry;
use crate::supervisor::{Supervisor, SupervisorEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Checking,
    Stopping,
    Configuring,
    Running,
    Dead,
    Failed,
}

enum Command {
    Check(ClusterSnapshot, oneshot::Sender<Result<(), AgentError>>),
    On(ClusterSnapshot, oneshot::Sender<Result<ProcessState, AgentError>>),
    Off(oneshot::Sender<Result<ProcessState, AgentError>>),
    Kill(oneshot::Sender<ProcessState>),
    Reset(oneshot::Sender<Result<(), AgentError>>),
    ChildExited(Option<i32>),
    HealthCheckFailed(String),
    HealthCheckPassed,
}

/// Handle shared with the control HTTP server; every call round-trips
/// through the single worker task.
#[derive(Clone)]
pub struct Lifecycle {
    tx: mpsc::Sender<Command>,
}

impl Lifecycle {
    pub fn spawn(hook: Arc<dyn Hook>, registry: Arc<Registry>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let supervisor_events_tx = tx.clone();
        let worker = Worker {
            state: State::Idle,
            restart_count: 0,
            last_launch: None,
            hook,
            registry,
            supervisor: Supervisor::new(),
            supervisor_events_tx,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    pub async fn check(&self, snapshot: ClusterSnapshot) -> Result<(), AgentError> {
        self.roundtrip(|reply| Command::Check(snapshot, reply)).await
    }

    pub async fn on(&self, snapshot: ClusterSnapshot) -> Result<ProcessState, AgentError> {
        self.roundtrip(|reply| Command::On(snapshot, reply)).await
    }

    pub async fn off(&self) -> Result<ProcessState, AgentError> {
        self.roundtrip(Command::Off).await
    }

    pub async fn kill(&self) -> ProcessState {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Kill(reply)).await;
        rx.await.unwrap_or(ProcessState::Dead)
    }

    pub async fn reset(&self) -> Result<(), AgentError> {
        self.roundtrip(Command::Reset).await
    }

    async fn roundtrip<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, AgentError>>) -> Command,
    ) -> Result<T, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| AgentError::FatalCoordLoss("lifecycle worker gone".to_string()))?;
        rx.await
            .map_err(|_| AgentError::FatalCoordLoss("lifecycle worker dropped the reply".to_string()))?
    }
}

struct Worker {
    state: State,
    restart_count: u32,
    last_launch: Option<Launch>,
    hook: Arc<dyn Hook>,
    registry: Arc<Registry>,
    supervisor: Supervisor,
    supervisor_events_tx: mpsc::Sender<Command>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Check(snapshot, reply) => {
                    let _ = reply.send(self.handle_check(&snapshot).await);
                }
                Command::On(snapshot, reply) => {
                    let _ = reply.send(self.handle_on(snapshot).await);
                }
                Command::Off(reply) => {
                    let _ = reply.send(self.handle_off().await);
                }
                Command::Kill(reply) => {
                    let _ = reply.send(self.handle_kill().await);
                }
                Command::Reset(reply) => {
                    let _ = reply.send(self.handle_reset().await);
                }
                Command::ChildExited(code) => self.handle_child_exited(code).await,
                Command::HealthCheckFailed(msg) => self.handle_health_check_failed(msg).await,
                Command::HealthCheckPassed => {
                    self.restart_count = 0;
                }
            }
        }
    }

    fn idling(&self) -> bool {
        matches!(self.state, State::Dead | State::Failed)
    }

    async fn handle_check(&mut self, snapshot: &ClusterSnapshot) -> Result<(), AgentError> {
        if self.idling() {
            return Err(AgentError::PodIdle);
        }
        self.state = State::Checking;
        let cluster = Cluster::from_snapshot(snapshot);
        let result = self.hook.can_configure(&cluster).map_err(AgentError::HookRejection);
        self.state = State::Idle;
        result
    }

    async fn handle_on(&mut self, snapshot: ClusterSnapshot) -> Result<ProcessState, AgentError> {
        // Unlike `check`/`off` (sweep-path RPCs, where §6's universal 410
        // rule applies), an explicit `/control/on` is the control RPC that
        // invariant 5 requires to leave `DEAD`/`FAILED` (S6: "/control/on
        // reattempts configuration"), so idling state never short-circuits
        // here.
        let cluster = Cluster::from_snapshot(&snapshot);
        self.hook
            .can_configure(&cluster)
            .map_err(AgentError::HookRejection)?;

        self.state = State::Configuring;

        if !self.hook.owns_subprocess() {
            self.state = State::Running;
            self.set_process(ProcessState::Running).await;
            return Ok(ProcessState::Running);
        }

        let launch = match self.hook.configure(&cluster) {
            Ok(launch) => launch,
            Err(err) => {
                self.state = State::Failed;
                self.set_process(ProcessState::Failed).await;
                return Err(AgentError::HookCrash(err));
            }
        };

        match self
            .supervisor
            .spawn(
                &launch,
                self.hook.cwd().as_deref(),
                self.hook.shell(),
                self.hook.check_every(),
                self.hook.clone(),
                self.supervisor_events_tx_as_events(),
            )
            .await
        {
            Ok(_pid) => {
                self.last_launch = Some(launch);
                self.restart_count = 0;
                self.state = State::Running;
                self.set_process(ProcessState::Running).await;
                Ok(ProcessState::Running)
            }
            Err(err) => {
                self.state = State::Failed;
                self.set_process(ProcessState::Failed).await;
                Err(AgentError::HookCrash(err.to_string()))
            }
        }
    }

    async fn handle_off(&mut self) -> Result<ProcessState, AgentError> {
        if self.idling() {
            return Err(AgentError::PodIdle);
        }
        if self.state == State::Running {
            self.state = State::Stopping;
            if let Some(pid) = self.supervisor.pid().await {
                self.hook.tear_down(pid);
            }
            self.supervisor.stop(self.hook.grace()).await;
            if self.hook.full_shutdown() {
                tracing::warn!("full_shutdown hook requested, agent process will exit");
                std::process::exit(0);
            }
        }
        self.state = State::Idle;
        self.set_process(ProcessState::Stopped).await;
        Ok(ProcessState::Stopped)
    }

    async fn handle_kill(&mut self) -> ProcessState {
        if let Some(pid) = self.supervisor.pid().await {
            self.hook.tear_down(pid);
            self.supervisor.stop(self.hook.grace()).await;
        }
        self.state = State::Dead;
        self.set_process(ProcessState::Dead).await;
        ProcessState::Dead
    }

    async fn handle_reset(&mut self) -> Result<(), AgentError> {
        if let Some(pid) = self.supervisor.pid().await {
            self.supervisor.stop(self.hook.grace()).await;
            let _ = pid;
        }
        self.state = State::Idle;
        self.restart_count = 0;
        self.set_process(ProcessState::Stopped).await;
        Ok(())
    }

    async fn handle_child_exited(&mut self, code: Option<i32>) {
        if self.state != State::Running {
            return;
        }
        if code == Some(0) && !self.hook.strict() {
            tracing::info!("child exited voluntarily, pod going idle");
            self.state = State::Dead;
            self.set_process(ProcessState::Dead).await;
            return;
        }
        self.restart_count += 1;
        tracing::warn!(exit_code = ?code, attempt = self.restart_count, checks = self.hook.checks(), "child exited abnormally");
        self.recover_or_fail().await;
    }

    async fn handle_health_check_failed(&mut self, msg: String) {
        if self.state != State::Running {
            return;
        }
        tracing::warn!(error = %msg, "health check failure treated as a crash");
        if let Some(pid) = self.supervisor.pid().await {
            self.hook.tear_down(pid);
        }
        self.supervisor.stop(self.hook.grace()).await;
        self.restart_count += 1;
        self.recover_or_fail().await;
    }

    async fn recover_or_fail(&mut self) {
        if self.restart_count > self.hook.checks() {
            tracing::error!("restart budget exhausted, pod failed");
            self.state = State::Failed;
            self.set_process(ProcessState::Failed).await;
            return;
        }
        let Some(launch) = self.last_launch.clone() else {
            self.state = State::Failed;
            self.set_process(ProcessState::Failed).await;
            return;
        };
        match self
            .supervisor
            .spawn(
                &launch,
                self.hook.cwd().as_deref(),
                self.hook.shell(),
                self.hook.check_every(),
                self.hook.clone(),
                self.supervisor_events_tx_as_events(),
            )
            .await
        {
            Ok(_pid) => {
                self.state = State::Running;
            }
            Err(err) => {
                tracing::error!(error = %err, "restart attempt failed");
                self.state = State::Failed;
                self.set_process(ProcessState::Failed).await;
            }
        }
    }

    fn supervisor_events_tx_as_events(&self) -> mpsc::Sender<SupervisorEvent> {
        let (bridge_tx, mut bridge_rx) = mpsc::channel(32);
        let forward_tx = self.supervisor_events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = bridge_rx.recv().await {
                let command = match event {
                    SupervisorEvent::Exited(code) => Command::ChildExited(code),
                    SupervisorEvent::HealthCheckFailed(msg) => Command::HealthCheckFailed(msg),
                    SupervisorEvent::HealthCheckPassed => Command::HealthCheckPassed,
                };
                if forward_tx.send(command).await.is_err() {
                    return;
                }
            }
        });
        bridge_tx
    }

    async fn set_process(&self, process: ProcessState) {
        if let Err(err) = self.registry.update(|d| d.process = process).await {
            tracing::warn!(error = %err, "failed to persist process state");
        }
    }
}

/// Convenience for handlers that just need the current externally-visible
/// state without going through the actor (cheap, read-only).
pub async fn info(registry: &Registry) -> (ProcessState, PodRole) {
    let descriptor = registry.descriptor().await;
    (descriptor.process, descriptor.state)
}
