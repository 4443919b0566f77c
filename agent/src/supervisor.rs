//! Subprocess Supervisor (C8, §4.8): owns the child process while the
//! lifecycle is `RUNNING` — fork/exec, graceful shutdown with escalation,
//! and the periodic health check. Restart-with-backoff policy lives in
//! `lifecycle`, which owns the FSM and the restart counter; this module
//! only ever supervises one live child at a time (§8 property 7).

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::hook::{Hook, Launch};

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub enum SupervisorError {
    AlreadyRunning,
    Spawn(String),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::AlreadyRunning => write!(f, "a child is already running"),
            SupervisorError::Spawn(msg) => write!(f, "failed to spawn child: {msg}"),
        }
    }
}

impl std::error::Error for SupervisorError {}

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The child exited; `None` when the exit code is unavailable (e.g.
    /// terminated by a signal).
    Exited(Option<i32>),
    HealthCheckFailed(String),
    /// A successful periodic check; resets the restart counter (§4.8).
    HealthCheckPassed,
}

pub struct Supervisor {
    pid: Arc<Mutex<Option<u32>>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            pid: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        *self.pid.lock().await
    }

    /// Forks/execs `launch` and starts the background wait and health-check
    /// loops. Only one child may be live at a time.
    pub async fn spawn(
        &self,
        launch: &Launch,
        cwd: Option<&Path>,
        shell: bool,
        check_every: Duration,
        hook: Arc<dyn Hook>,
        events_tx: mpsc::Sender<SupervisorEvent>,
    ) -> Result<u32, SupervisorError> {
        if self.pid.lock().await.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let mut command = build_command(launch, shell);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| SupervisorError::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Spawn("child exited before its pid was observed".to_string()))?;
        *self.pid.lock().await = Some(pid);

        let wait_slot = self.pid.clone();
        let wait_events_tx = events_tx.clone();
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(err) => {
                    tracing::warn!(error = %err, pid, "failed to wait on child, assuming it is gone");
                    None
                }
            };
            *wait_slot.lock().await = None;
            let _ = wait_events_tx.send(SupervisorEvent::Exited(exit_code)).await;
        });

        let check_slot = self.pid.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(check_every).await;
                let Some(current_pid) = *check_slot.lock().await else {
                    return;
                };
                let outcome = match hook.sanity_check(current_pid) {
                    Ok(()) => SupervisorEvent::HealthCheckPassed,
                    Err(err) => {
                        tracing::warn!(pid = current_pid, error = %err, "periodic health check failed");
                        SupervisorEvent::HealthCheckFailed(err)
                    }
                };
                if events_tx.send(outcome).await.is_err() {
                    return;
                }
            }
        });

        Ok(pid)
    }

    /// Graceful shutdown: `SIGTERM`, wait up to `grace`, escalate to
    /// `SIGKILL` (§4.8). A no-op if nothing is running.
    pub async fn stop(&self, grace: Duration) {
        let Some(pid) = *self.pid.lock().await else {
            return;
        };
        send_signal(pid, Signal::SIGTERM);

        let deadline = Instant::now() + grace;
        loop {
            if self.pid.lock().await.is_none() {
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SIGNAL_POLL_INTERVAL).await;
        }

        if let Some(pid) = *self.pid.lock().await {
            tracing::warn!(pid, "child did not exit within grace period, sending SIGKILL");
            send_signal(pid, Signal::SIGKILL);
        }
    }
}

fn send_signal(pid: u32, sig: Signal) {
    if let Err(err) = signal::kill(Pid::from_raw(pid as i32), sig) {
        tracing::warn!(pid, signal = ?sig, error = %err, "failed to signal child");
    }
}

fn build_command(launch: &Launch, shell: bool) -> Command {
    let mut command = if shell {
        let mut line = launch.program.clone();
        for arg in &launch.args {
            line.push(' ');
            line.push_str(arg);
        }
        let mut c = Command::new("/bin/sh");
        c.arg("-c").arg(line);
        c
    } else {
        let mut c = Command::new(&launch.program);
        c.args(&launch.args);
        c
    };
    command.envs(&launch.env);
    command.kill_on_drop(false);
    command
}
