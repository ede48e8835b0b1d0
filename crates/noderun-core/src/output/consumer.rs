//! Line consumers.

use std::sync::Mutex;

/// Anything that can receive one line of process output.
pub trait LineConsumer: Send + Sync {
    /// Accept one line. Called from the monitor task, in registration order.
    fn accept(&self, line: &str);
}

/// Collects raw output lines for diagnostics after a failed start.
#[derive(Debug, Default)]
pub struct DiagnosticBuffer {
    lines: Mutex<Vec<String>>,
}

impl DiagnosticBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the buffered lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .is_empty()
    }
}

impl LineConsumer for DiagnosticBuffer {
    fn accept(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(line.trim().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_starts_empty() {
        let buffer = DiagnosticBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_buffer_trims_and_keeps_order() {
        let buffer = DiagnosticBuffer::new();
        buffer.accept("  first line\n");
        buffer.accept("second\r\n");
        buffer.accept("");

        assert!(!buffer.is_empty());
        assert_eq!(buffer.lines(), vec!["first line", "second", ""]);
    }
}
