//! noderun - launch a server node and wait until it is ready.
//!
//! The library starts a server executable as a child process, scrapes its
//! output for the HTTP `publish_address` it announces, and polls that
//! address until the port accepts connections and the cluster reports a
//! healthy status. If the node never becomes ready, the captured output (or
//! the node's own log file) is logged for diagnosis. Stopping the node
//! terminates the process and removes its data directories.
//!
//! # Example
//!
//! ```rust,ignore
//! use noderun::{LaunchSpec, NodeOptions, NodeSupervisor};
//!
//! #[tokio::main]
//! async fn main() -> noderun::Result<()> {
//!     let spec = LaunchSpec::from_distribution("/opt/crate-4.0.0", NodeOptions::default())?;
//!     let mut node = NodeSupervisor::new(spec)?;
//!
//!     node.start().await?;
//!     println!("Node ready at {:?}", node.ready_url());
//!
//!     node.stop().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod launch;
pub mod output;
pub mod process;
pub mod readiness;

// Re-export commonly used types
pub use config::{NodeDefaults, ReadinessConfig, ReadinessDefaults};
pub use error::{NodeError, Result};
pub use launch::{parse_options, LaunchSpec, NodeOptions, SettingValue, Settings};
pub use output::{
    parse_publish_address, AddressExtractor, DiagnosticBuffer, LineConsumer, NetworkAddress,
    OutputMonitor, Protocol,
};
pub use process::{Diagnostics, NodeState, NodeSupervisor};
pub use readiness::{NetworkProbes, ReadinessProbe, ReadinessStage};
