//! Node supervisor: launch, readiness, diagnostics and teardown.

use super::state::NodeState;
use super::terminate::terminate;
use crate::config::ReadinessConfig;
use crate::error::{NodeError, Result};
use crate::launch::LaunchSpec;
use crate::output::{
    AddressExtractor, DiagnosticBuffer, NetworkAddress, OutputMonitor, Protocol,
};
use crate::readiness::{wait_until, NetworkProbes, ReadinessProbe, ReadinessStage};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, RwLock};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Diagnostics emitted after a failed start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostics {
    /// Output lines captured while waiting.
    Buffered(Vec<String>),
    /// The node printed nothing, so its own log file was consulted.
    /// `lines` is `None` if the file could not be read.
    LogFile {
        path: PathBuf,
        lines: Option<Vec<String>>,
    },
    /// The node printed nothing and has no log file.
    Empty,
}

type AddressSlot = Arc<RwLock<Option<NetworkAddress>>>;

/// Supervises one server process from launch to teardown.
///
/// [`start`](Self::start) launches the process and blocks until the node has
/// announced an HTTP address, accepts connections on it and reports a healthy
/// cluster. [`stop`](Self::stop) terminates the process and removes its data
/// directories. Dropping a supervisor that was never stopped kills the
/// process and removes the data directories without waiting.
///
/// # Example
///
/// ```rust,no_run
/// use noderun::{LaunchSpec, NodeOptions, NodeSupervisor};
///
/// #[tokio::main]
/// async fn main() -> noderun::Result<()> {
///     let spec = LaunchSpec::from_distribution("/opt/crate-4.0.0", NodeOptions::default())?;
///     let mut node = NodeSupervisor::new(spec)?;
///     node.start().await?;
///     println!("ready at {}", node.ready_url().unwrap_or_default());
///     node.stop().await
/// }
/// ```
pub struct NodeSupervisor {
    spec: LaunchSpec,
    config: ReadinessConfig,
    probe: Arc<dyn ReadinessProbe>,
    monitor: OutputMonitor,
    child: Option<Child>,
    http_address: AddressSlot,
    ready_url: Option<String>,
    diagnostics: Option<Diagnostics>,
    state: NodeState,
}

impl NodeSupervisor {
    /// Create a supervisor that probes the node over the network.
    pub fn new(spec: LaunchSpec) -> Result<Self> {
        Ok(Self::with_probe(spec, Arc::new(NetworkProbes::new()?)))
    }

    /// Create a supervisor with custom readiness probes.
    pub fn with_probe(spec: LaunchSpec, probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            spec,
            config: ReadinessConfig::default(),
            probe,
            monitor: OutputMonitor::new(),
            child: None,
            http_address: Arc::new(RwLock::new(None)),
            ready_url: None,
            diagnostics: None,
            state: NodeState::NotStarted,
        }
    }

    /// Override the readiness and stop timeouts.
    pub fn with_timeouts(mut self, config: ReadinessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Process ID, while the process is owned by the supervisor.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// The ready URL, `http://host:port` or `https://host:port`.
    ///
    /// Only available once the node is [`NodeState::Ready`].
    pub fn ready_url(&self) -> Option<&str> {
        match self.state {
            NodeState::Ready => self.ready_url.as_deref(),
            _ => None,
        }
    }

    /// The most recently announced HTTP address.
    pub fn http_address(&self) -> Option<NetworkAddress> {
        self.http_address
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    pub fn data_paths(&self) -> &[PathBuf] {
        &self.spec.data_paths
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.spec.log_file()
    }

    /// Diagnostics emitted by the last failed start, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Launch the process and wait until the node is ready.
    ///
    /// On a readiness failure the captured output (or the node's log file,
    /// if it printed nothing) is logged before the error is returned. The
    /// process keeps running until [`stop`](Self::stop) or drop.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != NodeState::NotStarted {
            return Err(NodeError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }

        self.state = NodeState::Launching;
        info!("Starting node process {}", self.spec.executable.display());

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("{}", e);
                self.state = NodeState::Failed;
                return Err(e);
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.log_launch(child.id());
        self.child = Some(child);

        let slot = self.http_address.clone();
        self.monitor
            .register(Arc::new(AddressExtractor::new(move |address| {
                record_address(&slot, address)
            })));
        let buffer = Arc::new(DiagnosticBuffer::new());
        let buffer_id = self.monitor.register(buffer.clone());

        match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => self.monitor.start(stdout, stderr),
            _ => warn!("Process output is not captured, address discovery will time out"),
        }

        match self.await_readiness().await {
            Ok(url) => {
                self.monitor.deregister(buffer_id);
                info!("Node ready to process requests at {}", url);
                self.ready_url = Some(url);
                self.state = NodeState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = NodeState::Failed;
                let diagnostics = self.emit_diagnostics(&buffer).await;
                self.diagnostics = Some(diagnostics);
                self.monitor.deregister(buffer_id);
                error!("Node failed to become ready: {}", e);
                Err(e)
            }
        }
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.spec.executable);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|source| NodeError::LaunchFailed {
            executable: self.spec.executable.clone(),
            source,
        })
    }

    fn log_launch(&self, pid: Option<u32>) {
        let data = self
            .spec
            .data_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let logs = self
            .spec
            .log_file()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "Node launched:\n    PID: {}\n    Logs: {}\n    Data: {}{}",
            pid.unwrap_or_default(),
            logs,
            data,
            if self.spec.keep_data { "" } else { " (removed on stop)" }
        );
    }

    /// Run the readiness stages in order and return the ready URL.
    async fn await_readiness(&mut self) -> Result<String> {
        let interval = self.config.poll_interval;
        let monitor = &self.monitor;
        let probe = &*self.probe;
        let slot = &self.http_address;
        let Some(child) = self.child.as_mut() else {
            return Err(NodeError::InvalidState {
                operation: "await readiness",
                state: self.state.to_string(),
            });
        };

        self.state = NodeState::AwaitingAddress;
        let timeout = self.config.address_timeout;
        wait_until(ReadinessStage::Address, timeout, interval, || {
            let reader = check_reader(monitor, child);
            let found = slot
                .read()
                .unwrap_or_else(|poison| poison.into_inner())
                .is_some();
            async move { reader.map(|()| found) }
        })
        .await?;

        let address = slot
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
            .ok_or(NodeError::Timeout {
                stage: ReadinessStage::Address,
                timeout,
            })?;

        self.state = NodeState::AwaitingPort;
        let target = &address;
        wait_until(
            ReadinessStage::Port,
            self.config.port_timeout,
            interval,
            || {
                let reader = check_reader(monitor, child);
                async move {
                    reader?;
                    Ok(probe.port_open(target).await)
                }
            },
        )
        .await?;

        let mut url = format!("http://{}", address.authority());
        if probe.tls_enabled(&address).await {
            debug!("{} speaks TLS", address);
            url = format!("https://{}", address.authority());
        }

        self.state = NodeState::AwaitingHealth;
        let base_url = url.as_str();
        wait_until(
            ReadinessStage::Health,
            self.config.health_timeout,
            interval,
            || {
                let reader = check_reader(monitor, child);
                async move {
                    reader?;
                    Ok(probe.healthy(base_url).await)
                }
            },
        )
        .await?;

        Ok(url)
    }

    /// Log what the node printed, or its log file if it printed nothing.
    async fn emit_diagnostics(&self, buffer: &DiagnosticBuffer) -> Diagnostics {
        if !buffer.is_empty() {
            let lines = buffer.lines();
            for line in &lines {
                error!("{}", line);
            }
            return Diagnostics::Buffered(lines);
        }

        match self.spec.log_file() {
            Some(path) => {
                let lines = read_log_file(&path).await;
                for line in lines.iter().flatten() {
                    error!("{}", line);
                }
                Diagnostics::LogFile { path, lines }
            }
            None => Diagnostics::Empty,
        }
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(NodeError::InvalidState {
                operation: "wait",
                state: self.state.to_string(),
            });
        };
        Ok(child.wait().await?)
    }

    /// Terminate the process and remove the data directories.
    ///
    /// Every teardown step is attempted even if an earlier one fails; the
    /// failures are returned together as [`NodeError::Teardown`]. Calling
    /// `stop` again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == NodeState::Stopped {
            debug!("Node already stopped");
            return Ok(());
        }

        let mut failures = Vec::new();
        if let Some(mut child) = self.child.take() {
            info!("Stopping node process");
            if let Err(e) = terminate(&mut child, self.config.stop_timeout).await {
                failures.push(e);
            }
        }
        self.monitor.shutdown();

        if !self.spec.keep_data {
            for path in &self.spec.data_paths {
                if let Err(e) = remove_data_path(path).await {
                    failures.push(e);
                }
            }
        }

        self.state = NodeState::Stopped;
        self.ready_url = None;

        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                warn!("Teardown: {}", failure);
            }
            Err(NodeError::Teardown { failures })
        }
    }
}

impl Drop for NodeSupervisor {
    fn drop(&mut self) {
        if self.state == NodeState::Stopped {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill node process on drop: {}", e);
            }
        }
        if !self.spec.keep_data {
            for path in &self.spec.data_paths {
                match std::fs::remove_dir_all(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
    }
}

impl std::fmt::Debug for NodeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSupervisor")
            .field("executable", &self.spec.executable)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .field("ready_url", &self.ready_url)
            .finish_non_exhaustive()
    }
}

fn record_address(slot: &AddressSlot, address: NetworkAddress) {
    info!("{:10}: {}", address.protocol.as_str(), address);
    if address.protocol == Protocol::Http {
        *slot.write().unwrap_or_else(|poison| poison.into_inner()) = Some(address);
    }
}

/// Surface a reader failure unless the process has already exited.
///
/// The failure slot is filled by the reader task, and the exit status is
/// queried afterwards on this task. A read error observed after the process
/// exited is treated as the end of output, even if the read failed a moment
/// before the exit.
fn check_reader(monitor: &OutputMonitor, child: &mut Child) -> Result<()> {
    let Some(source) = monitor.take_failure() else {
        return Ok(());
    };
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("Output reader stopped after process exit ({}): {}", status, source);
            Ok(())
        }
        Ok(None) | Err(_) => Err(NodeError::OutputReader { source }),
    }
}

async fn read_log_file(path: &Path) -> Option<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents.lines().map(str::to_string).collect()),
        Err(e) => {
            debug!("Cannot read log file {}: {}", path.display(), e);
            None
        }
    }
}

async fn remove_data_path(path: &Path) -> std::result::Result<(), String> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Data path {} does not exist", path.display());
            Ok(())
        }
        Err(e) => Err(format!("failed to remove {}: {}", path.display(), e)),
    }
}
