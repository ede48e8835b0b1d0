//! Bounded polling.

use super::ReadinessStage;
use crate::error::{NodeError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks how long a readiness stage has been waiting.
///
/// The first call to [`expired`](Deadline::expired) returns `false` right
/// away, so the guarded check always runs at least once without delay, even
/// with a zero timeout. Every later call sleeps for the poll interval first
/// and then compares the time since construction against the timeout.
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    interval: Duration,
    first: bool,
}

impl Deadline {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            interval,
            first: true,
        }
    }

    /// Returns true once the timeout has passed.
    pub async fn expired(&mut self) -> bool {
        if self.first {
            self.first = false;
            return false;
        }
        tokio::time::sleep(self.interval).await;
        self.started.elapsed() > self.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Run `predicate` until it returns `Ok(true)` or the deadline expires.
///
/// Errors from the predicate end the wait immediately and are returned
/// unchanged. Expiry is reported as [`NodeError::Timeout`] for `stage`.
pub async fn wait_until<F, Fut>(
    stage: ReadinessStage,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut deadline = Deadline::new(timeout, interval);
    loop {
        if deadline.expired().await {
            return Err(NodeError::Timeout { stage, timeout });
        }
        if predicate().await? {
            return Ok(());
        }
    }
}
