//! Background output streaming with fan-out to line consumers.

use super::consumer::LineConsumer;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle returned by [`OutputMonitor::register`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

type ConsumerSet = Arc<RwLock<Vec<(ConsumerId, Arc<dyn LineConsumer>)>>>;

/// Streams a process's stdout and stderr on one background task and hands
/// every line to all registered consumers, in registration order.
///
/// Consumers may be registered and deregistered at any time; the change
/// applies from the next line read. A read error stops the task and is kept
/// in a failure slot for the owner to inspect with [`take_failure`], since
/// only the owner knows whether the process had already exited.
///
/// [`take_failure`]: OutputMonitor::take_failure
pub struct OutputMonitor {
    consumers: ConsumerSet,
    next_id: AtomicU64,
    failure: Arc<Mutex<Option<io::Error>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputMonitor {
    pub fn new() -> Self {
        Self {
            consumers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
            failure: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    /// Register a consumer. It receives every line read after this call.
    pub fn register(&self, consumer: Arc<dyn LineConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.consumers
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .push((id, consumer));
        id
    }

    /// Remove a consumer. Returns false if it was not registered.
    pub fn deregister(&self, id: ConsumerId) -> bool {
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        let before = consumers.len();
        consumers.retain(|(existing, _)| *existing != id);
        consumers.len() != before
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    /// Start streaming. Must be called from within a tokio runtime.
    ///
    /// Any previously started reader is aborted first.
    pub fn start<O, E>(&mut self, stdout: O, stderr: E)
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        self.shutdown();
        let consumers = self.consumers.clone();
        let failure = self.failure.clone();

        self.task = Some(tokio::spawn(async move {
            match pump(stdout, stderr, consumers).await {
                Ok(()) => debug!("Process output closed"),
                Err(e) => {
                    warn!("Reading process output failed: {}", e);
                    *failure.lock().unwrap_or_else(|poison| poison.into_inner()) = Some(e);
                }
            }
        }));
    }

    /// Take the read error that stopped the reader, if any.
    pub fn take_failure(&self) -> Option<io::Error> {
        self.failure
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take()
    }

    /// Whether the reader task is still streaming.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the reader task.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for OutputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for OutputMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputMonitor")
            .field("consumers", &self.consumer_count())
            .field("running", &self.is_running())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Reads newline-terminated lines, replacing invalid UTF-8.
///
/// Partially read bytes stay in `buf`, so `next_line` can be raced in
/// `select!` without losing data.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(|c| c == '\n' || c == '\r')
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

async fn pump<O, E>(stdout: O, stderr: E, consumers: ConsumerSet) -> io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = LineReader::new(stdout);
    let mut stderr = LineReader::new(stderr);
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        let (stream, line) = tokio::select! {
            line = stdout.next_line(), if stdout_open => (Stream::Stdout, line?),
            line = stderr.next_line(), if stderr_open => (Stream::Stderr, line?),
            else => return Ok(()),
        };

        match line {
            Some(line) => dispatch(&consumers, &line),
            None => match stream {
                Stream::Stdout => stdout_open = false,
                Stream::Stderr => stderr_open = false,
            },
        }
    }
}

fn dispatch(consumers: &ConsumerSet, line: &str) {
    // Snapshot so consumers run without the lock held.
    let snapshot: Vec<Arc<dyn LineConsumer>> = consumers
        .read()
        .unwrap_or_else(|poison| poison.into_inner())
        .iter()
        .map(|(_, consumer)| consumer.clone())
        .collect();

    for consumer in snapshot {
        consumer.accept(line);
    }
}
