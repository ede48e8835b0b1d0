//! Supervisor lifecycle states.

use std::fmt;

/// Where a [`NodeSupervisor`](super::NodeSupervisor) is in its lifecycle.
///
/// ```text
/// NotStarted -> Launching -> AwaitingAddress -> AwaitingPort -> AwaitingHealth -> Ready
///                                  \                 |                /
///                                   +-----------> Failed <-----------+
/// any state --stop()--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    Launching,
    AwaitingAddress,
    AwaitingPort,
    AwaitingHealth,
    Ready,
    Failed,
    Stopped,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::NotStarted => "not started",
            NodeState::Launching => "launching",
            NodeState::AwaitingAddress => "awaiting address",
            NodeState::AwaitingPort => "awaiting port",
            NodeState::AwaitingHealth => "awaiting health",
            NodeState::Ready => "ready",
            NodeState::Failed => "failed",
            NodeState::Stopped => "stopped",
        }
    }

    /// Whether the readiness protocol is in progress.
    pub fn is_awaiting(&self) -> bool {
        matches!(
            self,
            NodeState::AwaitingAddress | NodeState::AwaitingPort | NodeState::AwaitingHealth
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaiting_states() {
        assert!(NodeState::AwaitingAddress.is_awaiting());
        assert!(NodeState::AwaitingHealth.is_awaiting());
        assert!(!NodeState::Ready.is_awaiting());
        assert!(!NodeState::Launching.is_awaiting());
        assert_eq!(NodeState::AwaitingPort.to_string(), "awaiting port");
    }
}
