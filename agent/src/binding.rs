//! Binding Probe (C2, §4.2): a one-shot environment probe producing the
//! descriptor fields the orchestrator is responsible for. Framework-specific
//! scrapers (Marathon/EC2/Kubernetes metadata lookups) are out of scope
//! (§1); `EnvBinding` implements the one binding the spec fixes in full —
//! plain environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use crate::config::Config;

#[derive(Debug)]
pub struct BindingError(pub String);

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding probe failed: {}", self.0)
    }
}

impl std::error::Error for BindingError {}

/// Fields the binding is responsible for resolving, per §3/§4.2. `process`,
/// `state` and `uuid` are owned by the agent itself, not the binding.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub node: String,
    pub task: String,
    pub ip: String,
    pub public: String,
    pub ports: BTreeMap<u16, u16>,
    pub port: String,
    pub application: String,
}

pub trait Binding: Send + Sync {
    fn probe(&self, config: &Config) -> Result<ProbeResult, BindingError>;
}

/// Reads `POD_NODE`, `POD_TASK`, `POD_IP`, `POD_PUBLIC_IP`, `POD_PORTS`
/// (`containerPort:hostPort[,containerPort:hostPort]*`) and
/// `POD_CONTROL_CONTAINER_PORT` from the environment.
pub struct EnvBinding;

impl Binding for EnvBinding {
    fn probe(&self, config: &Config) -> Result<ProbeResult, BindingError> {
        let node = env::var("POD_NODE")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string());

        let task = env::var("POD_TASK")
            .or_else(|_| env::var("MESOS_TASK_ID"))
            .map_err(|_| BindingError("missing POD_TASK/MESOS_TASK_ID".to_string()))?;

        let ip = env::var("POD_IP").map_err(|_| BindingError("missing POD_IP".to_string()))?;
        let public = env::var("POD_PUBLIC_IP").unwrap_or_else(|_| ip.clone());

        let ports = parse_port_map(&env::var("POD_PORTS").unwrap_or_default())?;

        let control_container_port = env::var("POD_CONTROL_CONTAINER_PORT")
            .unwrap_or_else(|_| config.control_port.to_string());
        let control_key: u16 = control_container_port
            .parse()
            .map_err(|_| BindingError("POD_CONTROL_CONTAINER_PORT is not a valid port".to_string()))?;
        if !ports.contains_key(&control_key) {
            return Err(BindingError(format!(
                "POD_PORTS does not contain the control port {control_key}"
            )));
        }

        let application = config
            .application
            .clone()
            .unwrap_or_else(|| task.clone());

        Ok(ProbeResult {
            node,
            task,
            ip,
            public,
            ports,
            port: control_key.to_string(),
            application,
        })
    }
}

fn parse_port_map(raw: &str) -> Result<BTreeMap<u16, u16>, BindingError> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').filter(|s| !s.is_empty()) {
        let (container, host) = entry
            .split_once(':')
            .ok_or_else(|| BindingError(format!("malformed port pair: {entry}")))?;
        let container: u16 = container
            .parse()
            .map_err(|_| BindingError(format!("malformed container port: {container}")))?;
        let host: u16 = host
            .parse()
            .map_err(|_| BindingError(format!("malformed host port: {host}")))?;
        map.insert(container, host);
    }
    Ok(map)
}
