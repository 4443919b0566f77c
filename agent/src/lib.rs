//! The pod agent: one process per pod, built from the nine components
//! described in the workspace's design ledger. This crate is a binary
//! first; the library target exists so the top-level `tests` crate can
//! drive real components (gated behind `test-util`) against an in-memory
//! coordination backend instead of reimplementing them.

pub mod binding;
pub mod config;
pub mod coordination;
pub mod driver;
pub mod election;
pub mod errors;
pub mod hook;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod supervisor;
pub mod watcher;
