//! Wires the nine components together for one pod: probes the binding,
//! registers in the coordination store, contests leadership, and runs the
//! watcher/driver pair only while leading, alongside the lifecycle FSM and
//! the control HTTP server, which run unconditionally.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use pod_agent::binding::{Binding, EnvBinding};
use pod_agent::config::Config;
use pod_agent::coordination::{CoordinationClient, EtcdCoordinationClient, SessionEvent};
use pod_agent::driver::Driver;
use pod_agent::election::Election;
use pod_agent::hook::ShellHook;
use pod_agent::http::{self, PodState};
use pod_agent::lifecycle::Lifecycle;
use pod_agent::logging;
use pod_agent::registry::Registry;
use pod_agent::watcher::ClusterWatcher;

use shared::model::{PodDescriptor, PodRole, ProcessState};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    let log_buffer = logging::init(config.debug);

    let probe = match EnvBinding.probe(&config) {
        Ok(probe) => probe,
        Err(err) => {
            tracing::error!(error = %err, "binding probe failed");
            return ExitCode::from(1);
        }
    };

    let client: Arc<dyn CoordinationClient> = match EtcdCoordinationClient::connect(
        &[config.coord_endpoint.clone()],
        config.session_timeout_secs,
    )
    .await
    {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to coordination service");
            return ExitCode::from(2);
        }
    };

    let mut descriptor = PodDescriptor::default();
    descriptor.node = probe.node;
    descriptor.task = probe.task;
    descriptor.ip = probe.ip;
    descriptor.public = probe.public;
    descriptor.ports = probe.ports;
    descriptor.port = probe.port;
    descriptor.application = probe.application;
    descriptor.cluster = config.cluster_name.clone();
    // `ochopod_start` needs no extra gating here: nothing runs the
    // subprocess until an explicit `/control/on`, so a freshly registered
    // pod always starts `stopped` regardless of the flag's value.
    descriptor.process = ProcessState::Stopped;
    descriptor.state = PodRole::Follower;

    let registry = Arc::new(Registry::new(client.clone(), descriptor));
    if let Err(err) = registry.register(config.register_retries).await {
        tracing::error!(error = %err, "registration exhausted its retry budget");
        return ExitCode::from(2);
    }

    // TODO: resolve `hook` from an external configure script per the
    // orchestrator's packaging contract. A fixed shell command stands in
    // for it here since that resolution mechanism is out of scope.
    let hook: Arc<dyn pod_agent::hook::Hook> =
        Arc::new(ShellHook::new("/bin/sleep", vec!["3600".to_string()]));

    let lifecycle = Lifecycle::spawn(hook, registry.clone());

    let state = actix_web::web::Data::new(PodState {
        lifecycle: lifecycle.clone(),
        registry: registry.clone(),
        log_buffer,
    });
    let http_fut = http::run(state, config.control_port);

    let is_leader = Arc::new(AtomicBool::new(false));
    let (role_tx, _role_rx) = watch::channel(PodRole::Follower);
    let (sweep_tx, sweep_rx) = mpsc::channel(8);

    let election_fut = run_leadership(
        client.clone(),
        config.cluster_name.clone(),
        hook.clone(),
        role_tx,
        is_leader.clone(),
        sweep_tx,
        sweep_rx,
    );

    let session_fut = watch_session_loss(client.clone());

    tokio::select! {
        result = http_fut => {
            if let Err(err) = result {
                tracing::error!(error = %err, "control server exited");
            }
            ExitCode::from(1)
        }
        () = election_fut => ExitCode::from(2),
        () = session_fut => ExitCode::from(2),
    }
}

/// Runs the election, and once leadership is won, the watcher/driver pair
/// that it feeds. Returns only on unrecoverable error (session loss is
/// handled by `watch_session_loss` racing this future in `main`).
async fn run_leadership(
    client: Arc<dyn CoordinationClient>,
    cluster: String,
    hook: Arc<dyn pod_agent::hook::Hook>,
    role_tx: watch::Sender<PodRole>,
    is_leader: Arc<AtomicBool>,
    sweep_tx: mpsc::Sender<shared::api::ClusterSnapshot>,
    sweep_rx: mpsc::Receiver<shared::api::ClusterSnapshot>,
) {
    let election = Election::new(client.clone(), cluster.clone());
    if let Err(err) = election.run(&role_tx).await {
        tracing::error!(error = %err, "election failed");
        return;
    }
    is_leader.store(true, Ordering::SeqCst);

    let watcher = ClusterWatcher::new(client.clone(), cluster.clone(), hook.depends_on(), hook.damper());
    let watcher_fut = watcher.run(sweep_tx);

    let driver = Arc::new(Driver::new(client, cluster, hook.damper(), hook.sequential()));
    let leader_flag = is_leader.clone();
    let driver_fut = driver.run(sweep_rx, Arc::new(move || leader_flag.load(Ordering::SeqCst)));

    tokio::select! {
        result = watcher_fut => {
            if let Err(err) = result {
                tracing::error!(error = %err, "cluster watcher stopped");
            }
        }
        () = driver_fut => {}
    }
}

async fn watch_session_loss(client: Arc<dyn CoordinationClient>) {
    let mut events = client.session_events();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Lost) => {
                tracing::error!("coordination session lost, exiting for orchestrator restart");
                return;
            }
            Ok(SessionEvent::Suspended) => {
                tracing::warn!("coordination session suspended, waiting for reconnect");
            }
            Ok(SessionEvent::Connected) => {}
            Err(_) => return,
        }
    }
}
