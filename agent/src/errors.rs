//! Unified error kinds (§7) and their mapping onto the control-port HTTP
//! surface, in the style of the teacher's `StoreError::to_http_response`.

use std::fmt;

use actix_web::HttpResponse as Http;

use crate::coordination::CoordError;

/// Error kinds from §7's table, minus `TransientCoordLoss` (handled by
/// retrying inside the Registry/Coordination layer and never surfaced).
#[derive(Debug)]
pub enum AgentError {
    /// C1 after the retry budget is exhausted; the agent exits(2).
    FatalCoordLoss(String),
    /// User `can_configure` rejected the proposed snapshot.
    HookRejection(String),
    /// User `configure` panicked or returned an error.
    HookCrash(String),
    /// Supervisor exhausted its restart budget (C8).
    ChildCrash(String),
    /// A peer was unreachable or returned an unexpected status during a sweep.
    PeerUnreachable(String),
    /// The leader lock was lost mid-sweep.
    LockLost,
    /// Universal §6 rule: the pod is `DEAD`/`FAILED` and the call is a no-op.
    PodIdle,
}

impl AgentError {
    pub fn to_http_response(&self) -> Http {
        match self {
            AgentError::HookRejection(msg) => Http::NotAcceptable().body(msg.clone()),
            AgentError::HookCrash(msg) => {
                Http::InternalServerError().body(format!("hook crashed: {msg}"))
            }
            AgentError::ChildCrash(msg) => {
                Http::InternalServerError().body(format!("child crashed: {msg}"))
            }
            AgentError::PeerUnreachable(msg) => Http::BadGateway().body(msg.clone()),
            AgentError::LockLost => Http::Gone().body("no longer leader"),
            AgentError::FatalCoordLoss(msg) => {
                Http::ServiceUnavailable().body(format!("coordination lost: {msg}"))
            }
            AgentError::PodIdle => Http::Gone().body("pod is idling"),
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::FatalCoordLoss(msg) => write!(f, "fatal coordination loss: {msg}"),
            AgentError::HookRejection(msg) => write!(f, "hook rejected configuration: {msg}"),
            AgentError::HookCrash(msg) => write!(f, "hook crashed: {msg}"),
            AgentError::ChildCrash(msg) => write!(f, "child crashed: {msg}"),
            AgentError::PeerUnreachable(msg) => write!(f, "peer unreachable: {msg}"),
            AgentError::LockLost => write!(f, "lock lost"),
            AgentError::PodIdle => write!(f, "pod is idling"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<CoordError> for AgentError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::Fatal(msg) => AgentError::FatalCoordLoss(msg),
            CoordError::Unreachable(msg) | CoordError::Transient(msg) => {
                AgentError::PeerUnreachable(msg)
            }
        }
    }
}
