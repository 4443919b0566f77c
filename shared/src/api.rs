//! JSON bodies for the control-port REST surface (§6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{PodDescriptor, ProcessState};

/// Body of `POST /control/check` and `POST /control/on`: the Phase-A
/// snapshot the Driver (C6) fixes before sweeping (§4.6 — "membership
/// observed mid-sweep is not re-read").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub members: Vec<PodDescriptor>,
    pub dependencies: BTreeMap<String, String>,
}

/// `200` body of `POST /info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub node: String,
    pub task: String,
    pub ip: String,
    pub public: String,
    pub application: String,
    pub cluster: String,
    pub process: ProcessState,
    pub state: crate::model::PodRole,
}

/// `200` body of `POST /log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResponse {
    pub lines: Vec<String>,
}

/// `200` body of `POST /reset`, `POST /control/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// `200` body of `POST /control/on`, `POST /control/off`, `POST /control/kill`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    pub state: ProcessState,
}

impl StateResponse {
    pub fn new(state: ProcessState) -> Self {
        Self { state }
    }
}
