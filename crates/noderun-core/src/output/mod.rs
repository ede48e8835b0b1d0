//! Process output handling.
//!
//! The supervised process writes unstructured log lines. An [`OutputMonitor`]
//! reads them on a background task and fans every line out to the registered
//! [`LineConsumer`]s:
//!
//! - [`AddressExtractor`] - picks `publish_address` announcements out of the log
//! - [`DiagnosticBuffer`] - keeps raw lines around for post-mortem reporting

mod address;
mod consumer;
mod monitor;

pub use address::{parse_publish_address, AddressExtractor, NetworkAddress, Protocol};
pub use consumer::{DiagnosticBuffer, LineConsumer};
pub use monitor::{ConsumerId, OutputMonitor};
