use std::fmt;

/// §7: `TransientCoordLoss` and `FatalCoordLoss`, plus a plain connection
/// failure for `connect()`.
#[derive(Debug, Clone)]
pub enum CoordError {
    /// `connect()` could not reach any endpoint.
    Unreachable(String),
    /// A single RPC failed; callers retry with back-off.
    Transient(String),
    /// The retry budget was exhausted; the caller must treat the session as lost.
    Fatal(String),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::Unreachable(msg) => write!(f, "coordination service unreachable: {msg}"),
            CoordError::Transient(msg) => write!(f, "transient coordination error: {msg}"),
            CoordError::Fatal(msg) => write!(f, "fatal coordination loss: {msg}"),
        }
    }
}

impl std::error::Error for CoordError {}
