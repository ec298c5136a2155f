//! Logging sink for misuse and bounds conditions
//!
//! Packet operations never log through a global directly. They call a
//! [`LogSink`] supplied by the embedding application; [`TracingSink`] is the
//! default and forwards to `tracing`.

use std::fmt;

use parking_lot::Mutex;

/// Log severity, syslog ordering (lower is more severe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        };
        write!(f, "{}", s)
    }
}

/// Fire-and-forget log destination
///
/// Implementations must not block and must not panic.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, component: &str, message: &str);
}

/// Forwards to the `tracing` macros
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, component: &str, message: &str) {
        match severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                tracing::error!(component = component, severity = %severity, "{}", message)
            }
            Severity::Warning => tracing::warn!(component = component, "{}", message),
            Severity::Notice | Severity::Info => {
                tracing::info!(component = component, "{}", message)
            }
            Severity::Debug => tracing::debug!(component = component, "{}", message),
        }
    }
}

/// One captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub component: String,
    pub message: String,
}

/// Keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, severity: Severity, component: &str, message: &str) {
        self.entries.lock().push(LogEntry {
            severity,
            component: component.to_string(),
            message: message.to_string(),
        });
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _severity: Severity, _component: &str, _message: &str) {}
}
