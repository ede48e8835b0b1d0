//! Process supervision.
//!
//! [`NodeSupervisor`] owns one server process: it launches it, drives the
//! readiness protocol against its output and network endpoints, and tears it
//! down again, removing the node's data directories.

mod state;
mod supervisor;
mod terminate;

pub use state::NodeState;
pub use supervisor::{Diagnostics, NodeSupervisor};
