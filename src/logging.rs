//! Injectable logging for the validation engine
//!
//! The engine never logs through a global; it receives an
//! `Arc<dyn PolicyLogger>` so callers and tests can choose the sink. Logging
//! is fire-and-forget: no method returns an error.

use std::sync::Mutex;

/// Log levels understood by [`PolicyLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Logging capability threaded through the engine
pub trait PolicyLogger: Send + Sync {
    fn log_info(&self, message: &str);
    fn log_warning(&self, message: &str);
    fn log_error(&self, message: &str);
}

/// Forwards to `tracing` under the `policyctl` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl PolicyLogger for TracingLogger {
    fn log_info(&self, message: &str) {
        tracing::info!(target: "policyctl", "{}", message);
    }

    fn log_warning(&self, message: &str) {
        tracing::warn!(target: "policyctl", "{}", message);
    }

    fn log_error(&self, message: &str) {
        tracing::error!(target: "policyctl", "{}", message);
    }
}

/// Discards every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl PolicyLogger for NoopLogger {
    fn log_info(&self, _message: &str) {}
    fn log_warning(&self, _message: &str) {}
    fn log_error(&self, _message: &str) {}
}

/// Keeps every message in memory, for tests and embedding callers
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured messages
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Captured messages at `level`
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, level: LogLevel, message: &str) {
        // A poisoned lock drops the message rather than failing the caller
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

impl PolicyLogger for MemoryLogger {
    fn log_info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn log_warning(&self, message: &str) {
        self.push(LogLevel::Warning, message);
    }

    fn log_error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}
