//! Graceful process termination.

use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

/// Ask the process to exit.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM so the server can shut down cleanly
/// - **Windows**: Kills the process, there is no graceful signal
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            // Already reaped.
            return Ok(());
        };
        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::from(e)),
        }
    }

    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

/// Terminate `child` and wait up to `timeout` for it to exit.
///
/// A process that outlives the timeout is killed, and the overrun is still
/// reported as an error so callers can surface it.
pub(crate) async fn terminate(child: &mut Child, timeout: Duration) -> Result<(), String> {
    let pid = child.id().unwrap_or_default();

    if let Ok(Some(status)) = child.try_wait() {
        debug!("Process {} already exited with {}", pid, status);
        return Ok(());
    }

    if let Err(e) = request_termination(child) {
        warn!("Failed to signal process {}: {}", pid, e);
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            info!("Process {} exited with {}", pid, status);
            Ok(())
        }
        Ok(Err(e)) => Err(format!("waiting for process {} failed: {}", pid, e)),
        Err(_) => {
            warn!(
                "Process {} did not exit within {:?}, killing it",
                pid, timeout
            );
            if let Err(e) = child.kill().await {
                return Err(format!("failed to kill process {}: {}", pid, e));
            }
            Err(format!("process {} did not exit within {:?}", pid, timeout))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn sh(script: &str) -> Child {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminates_cooperative_process() {
        let mut child = sh("exec sleep 30");
        terminate(&mut child, Duration::from_secs(5)).await.unwrap();
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_already_exited_process() {
        let mut child = sh("exit 0");
        child.wait().await.unwrap();
        terminate(&mut child, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stubborn_process_is_killed_and_reported() {
        let mut child = sh("trap '' TERM; while true; do sleep 0.05; done");
        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = terminate(&mut child, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.contains("did not exit"));
        assert!(child.try_wait().unwrap().is_some());
    }
}
