//! Log sink for user-facing operation messages.
//!
//! The manager and diagnostics engine report every outcome through a
//! [`LogSink`]. [`LogBuffer`] keeps a short history for display, and both
//! bundled sinks forward to `tracing`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

/// Maximum entries kept by [`LogBuffer`].
pub const MAX_ENTRIES: usize = 50;

/// Window in which an identical message is not recorded twice.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(2);

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Progress information.
    Info,
    /// An operation completed.
    Success,
    /// Something degraded but recoverable.
    Warning,
    /// An operation failed.
    Error,
}

/// A recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic identifier.
    pub id: u64,
    /// When the entry was recorded.
    pub timestamp: SystemTime,
    /// Message text.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

/// Receives operation messages.
pub trait LogSink: Send + Sync {
    /// Records a message.
    fn record(&self, message: &str, severity: Severity);
}

fn emit(message: &str, severity: Severity) {
    match severity {
        Severity::Error => tracing::error!("{message}"),
        Severity::Warning => tracing::warn!("{message}"),
        Severity::Info | Severity::Success => tracing::info!("{message}"),
    }
}

/// Sink that only forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, message: &str, severity: Severity) {
        emit(message, severity);
    }
}

/// Capped in-memory history, newest entry first.
pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    next_id: AtomicU64,
    snapshot: watch::Sender<Vec<LogEntry>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Vec::new());
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_ENTRIES)),
            next_id: AtomicU64::new(1),
            snapshot,
        }
    }

    /// Returns a copy of the history, newest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    /// Drops all entries.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.snapshot.send_replace(Vec::new());
    }

    /// Subscribes to history snapshots.
    ///
    /// The receiver always holds the latest snapshot, so bursts of records
    /// coalesce for slow readers.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<LogEntry>> {
        self.snapshot.subscribe()
    }

    fn is_duplicate(entries: &VecDeque<LogEntry>, message: &str, severity: Severity) -> bool {
        let now = SystemTime::now();
        entries.iter().any(|entry| {
            entry.message == message
                && entry.severity == severity
                && now
                    .duration_since(entry.timestamp)
                    .is_ok_and(|age| age < DUPLICATE_WINDOW)
        })
    }
}

impl LogSink for LogBuffer {
    fn record(&self, message: &str, severity: Severity) {
        emit(message, severity);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if Self::is_duplicate(&entries, message, severity) {
            return;
        }

        entries.push_front(LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: SystemTime::now(),
            message: message.to_owned(),
            severity,
        });
        entries.truncate(MAX_ENTRIES);

        self.snapshot.send_replace(entries.iter().cloned().collect());
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use tracing_subscriber::EnvFilter;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_maps_severity() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.record("printer ready", Severity::Success);
            TracingSink.record("paper low", Severity::Warning);
            TracingSink.record("cover open", Severity::Error);
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO"));
        assert!(output.contains("printer ready"));
        assert!(output.contains("WARN"));
        assert!(output.contains("paper low"));
        assert!(output.contains("ERROR"));
        assert!(output.contains("cover open"));
    }

    #[test]
    fn test_buffer_caps_and_orders() {
        let buffer = LogBuffer::new();
        for i in 0..60 {
            buffer.record(&format!("message {i}"), Severity::Info);
        }

        let entries = buffer.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].message, "message 59");
        assert_eq!(entries[MAX_ENTRIES - 1].message, "message 10");
        assert!(entries[0].id > entries[1].id);
    }

    #[test]
    fn test_buffer_suppresses_recent_duplicates() {
        let buffer = LogBuffer::new();
        buffer.record("printer ready", Severity::Success);
        buffer.record("printer ready", Severity::Success);
        buffer.record("printer ready", Severity::Warning);

        assert_eq!(buffer.entries().len(), 2);
    }

    #[test]
    fn test_buffer_clear() {
        let buffer = LogBuffer::new();
        let rx = buffer.subscribe();
        buffer.record("one", Severity::Info);
        assert_eq!(rx.borrow().len(), 1);

        buffer.clear();
        assert!(buffer.entries().is_empty());
        assert!(rx.borrow().is_empty());
    }
}
