//! Centralized configuration for noderun.
//!
//! Timing constants for the readiness protocol and teardown, plus the
//! settings every launched node starts from.

use std::time::Duration;

/// Readiness protocol timing defaults.
pub struct ReadinessDefaults;

impl ReadinessDefaults {
    pub const ADDRESS_TIMEOUT: Duration = Duration::from_secs(30);
    pub const PORT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    pub const HEALTH_PATH: &'static str = "/";
}

/// Teardown defaults.
pub struct StopDefaults;

impl StopDefaults {
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Node launch defaults.
pub struct NodeDefaults;

impl NodeDefaults {
    pub const CLUSTER_NAME: &'static str = "noderun";
    pub const LOGS_DIR_NAME: &'static str = "logs";
    pub const BIN_DIR_NAME: &'static str = "bin";
    pub const DATA_DIR_PREFIX: &'static str = "noderun-data-";

    /// Settings applied to every node before user overrides.
    pub const SETTINGS: &'static [(&'static str, DefaultSetting)] = &[
        (
            "cluster.routing.allocation.disk.watermark.low",
            DefaultSetting::Str("1b"),
        ),
        (
            "cluster.routing.allocation.disk.watermark.high",
            DefaultSetting::Str("1b"),
        ),
        ("discovery.initial_state_timeout", DefaultSetting::Int(0)),
        ("network.host", DefaultSetting::Str("127.0.0.1")),
        ("udc.enabled", DefaultSetting::Bool(false)),
    ];

    /// Launcher script name inside `<distribution>/bin`.
    pub fn start_script() -> &'static str {
        if cfg!(windows) {
            "crate.bat"
        } else {
            "crate"
        }
    }
}

/// A compile-time default setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSetting {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

/// Runtime timing configuration for one supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// How long to wait for an HTTP publish address in the output.
    pub address_timeout: Duration,
    /// How long to wait for the HTTP port to accept connections.
    pub port_timeout: Duration,
    /// How long to wait for the health endpoint to report status 200.
    pub health_timeout: Duration,
    /// Sleep between two attempts of the same stage.
    pub poll_interval: Duration,
    /// How long `stop` waits for the process after asking it to terminate.
    pub stop_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            address_timeout: ReadinessDefaults::ADDRESS_TIMEOUT,
            port_timeout: ReadinessDefaults::PORT_TIMEOUT,
            health_timeout: ReadinessDefaults::HEALTH_TIMEOUT,
            poll_interval: ReadinessDefaults::POLL_INTERVAL,
            stop_timeout: StopDefaults::STOP_TIMEOUT,
        }
    }
}

impl ReadinessConfig {
    /// Use the same timeout for every readiness stage.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.address_timeout = timeout;
        self.port_timeout = timeout;
        self.health_timeout = timeout;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_readiness_config() {
        let config = ReadinessConfig::default();
        assert_eq!(config.address_timeout, Duration::from_secs(30));
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_readiness_config_builder() {
        let config = ReadinessConfig::default()
            .with_stage_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(10));

        assert_eq!(config.address_timeout, Duration::from_secs(2));
        assert_eq!(config.port_timeout, Duration::from_secs(2));
        assert_eq!(config.health_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_default_settings_bind_loopback() {
        assert!(NodeDefaults::SETTINGS
            .iter()
            .any(|(k, v)| *k == "network.host" && *v == DefaultSetting::Str("127.0.0.1")));
    }
}
