//! Readiness detection.
//!
//! A node is usable once it has passed, in order:
//! 1. **Address** - an HTTP publish address appeared in its output
//! 2. **Port** - a TCP connect to that address succeeds
//! 3. **Health** - the cluster-status endpoint reports status 200
//!
//! Between port and health a single TLS handshake decides whether the ready
//! URL uses `http` or `https`. Each stage is retried with a [`Deadline`].

mod poll;
mod probe;
mod tls;

pub use poll::{wait_until, Deadline};
pub use probe::{NetworkProbes, ReadinessProbe};

use std::fmt;

/// A stage of the readiness protocol that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStage {
    Address,
    Port,
    Health,
}

impl fmt::Display for ReadinessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadinessStage::Address => "an HTTP publish address",
            ReadinessStage::Port => "the HTTP port to open",
            ReadinessStage::Health => "cluster health",
        })
    }
}
