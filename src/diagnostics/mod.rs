//! Printer diagnostics and recovery.
//!
//! [`PrinterDiagnostics`] borrows the manager's active transport for the
//! whole of a run, so probes never interleave with print jobs or heartbeats.
//! Probes that get no answer yield `None`: many printers are write-only over
//! RFCOMM and silence is not a failure. Diagnostics never declare the
//! connection lost; that stays with the manager.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::logging::{LogSink, Severity};
use crate::manager::ConnectionManager;
use crate::protocol::command::{INIT, diagnostic};
use crate::protocol::{
    diagnostic_page_frame, parse_error_status, parse_paper_status, parse_status,
};
use crate::transport::{Adapter, Transport};
use crate::types::{
    DiagnosticResult, ErrorStatus, PaperStatus, Recommendation, RecommendationLevel,
    StatusBitfield,
};

/// Status request variants, tried in order until one answers.
const STATUS_VARIANTS: [(&str, &[u8]); 3] = [
    ("printer status", diagnostic::STATUS_PRINTER),
    ("real-time status", diagnostic::STATUS_REAL_TIME),
    ("transmit status", diagnostic::STATUS_TRANSMIT),
];

const COMMUNICATION_PROBES: [(&str, &[u8]); 3] = [
    ("echo", diagnostic::ECHO_TEST),
    ("ping", diagnostic::PING),
    ("initialize", diagnostic::INITIALIZE),
];

/// Recovery remedies, least invasive first.
const RECOVERY_STEPS: [(&str, &[u8]); 4] = [
    ("clear buffer", diagnostic::CLEAR_BUFFER),
    ("soft reset", diagnostic::SOFT_RESET),
    ("wake up", diagnostic::WAKE_UP),
    ("initialize", diagnostic::INITIALIZE),
];

/// Timing for diagnostic runs.
#[derive(Debug, Clone)]
pub struct DiagnosticConfig {
    /// Pause between a status request and reading the reply.
    pub probe_settle: Duration,
    /// Pause between a communication probe and reading the reply.
    pub comm_settle: Duration,
    /// Reply timeout for paper, error and communication probes.
    pub read_timeout: Duration,
    /// Reply timeout for printer status probes.
    pub status_read_timeout: Duration,
    /// Wait after each recovery step.
    pub recovery_step_delay: Duration,
    /// Pause after the post-step communication test.
    pub quick_test_settle: Duration,
    /// Emergency reset: wait after clearing the buffer.
    pub emergency_clear_delay: Duration,
    /// Emergency reset: wait after the hard reset.
    pub emergency_reset_delay: Duration,
    /// Emergency reset: wait after re-initializing.
    pub emergency_init_delay: Duration,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            probe_settle: Duration::from_millis(300),
            comm_settle: Duration::from_millis(500),
            read_timeout: Duration::from_millis(1000),
            status_read_timeout: Duration::from_millis(1500),
            recovery_step_delay: Duration::from_millis(1000),
            quick_test_settle: Duration::from_millis(300),
            emergency_clear_delay: Duration::from_millis(500),
            emergency_reset_delay: Duration::from_millis(2000),
            emergency_init_delay: Duration::from_millis(1000),
        }
    }
}

impl DiagnosticConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status request settle time.
    #[must_use]
    pub const fn probe_settle(mut self, settle: Duration) -> Self {
        self.probe_settle = settle;
        self
    }

    /// Sets the reply timeout for paper, error and communication probes.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the reply timeout for status probes.
    #[must_use]
    pub const fn status_read_timeout(mut self, timeout: Duration) -> Self {
        self.status_read_timeout = timeout;
        self
    }

    /// Sets the wait after each recovery step.
    #[must_use]
    pub const fn recovery_step_delay(mut self, delay: Duration) -> Self {
        self.recovery_step_delay = delay;
        self
    }
}

/// Gets the current Unix timestamp.
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// One diagnostic pass over a borrowed transport.
struct Run<'a, T> {
    transport: &'a mut T,
    config: &'a DiagnosticConfig,
    log: &'a dyn LogSink,
    /// Set once any write went through.
    sent: bool,
}

impl<'a, T: Transport> Run<'a, T> {
    fn new(transport: &'a mut T, config: &'a DiagnosticConfig, log: &'a dyn LogSink) -> Self {
        Self {
            transport,
            config,
            log,
            sent: false,
        }
    }

    async fn write(&mut self, command: &'static [u8]) -> Result<()> {
        self.transport.write(Bytes::from_static(command)).await?;
        self.sent = true;
        Ok(())
    }

    /// Writes `command`, waits, and reads one reply.
    async fn probe(
        &mut self,
        command: &'static [u8],
        settle: Duration,
        timeout: Duration,
    ) -> Result<Option<Bytes>> {
        self.write(command).await?;
        tokio::time::sleep(settle).await;
        self.transport.read(timeout).await
    }

    fn connection(&self) -> bool {
        let connected = self.transport.is_connected();
        if connected {
            self.log.record("Connection active", Severity::Success);
        } else {
            self.log.record("Connection inactive", Severity::Error);
        }
        connected
    }

    async fn communication(&mut self) -> bool {
        for (name, command) in COMMUNICATION_PROBES {
            match self
                .probe(command, self.config.comm_settle, self.config.read_timeout)
                .await
            {
                Ok(Some(reply)) if !reply.is_empty() => {
                    self.log
                        .record(&format!("{name}: reply received"), Severity::Success);
                    return true;
                }
                Ok(_) => self
                    .log
                    .record(&format!("{name}: sent, no reply"), Severity::Warning),
                Err(e) => self
                    .log
                    .record(&format!("{name}: send failed: {e}"), Severity::Error),
            }
        }
        // Write-only printers never answer; a successful write is enough.
        self.sent
    }

    async fn status(&mut self, variants: &[(&str, &'static [u8])]) -> Option<StatusBitfield> {
        for &(name, command) in variants {
            let reply = self
                .probe(
                    command,
                    self.config.probe_settle,
                    self.config.status_read_timeout,
                )
                .await;
            match reply {
                Ok(Some(bytes)) => match parse_status(&bytes) {
                    Ok(status) => {
                        self.log.record(
                            &format!(
                                "{name}: {} (online: {}, paper: {}, error: {})",
                                hex::encode(&status.raw),
                                status.online,
                                status.paper_present,
                                status.has_error
                            ),
                            Severity::Info,
                        );
                        return Some(status);
                    }
                    Err(e) => self.log.record(&format!("{name}: {e}"), Severity::Warning),
                },
                Ok(None) => self
                    .log
                    .record(&format!("{name}: no reply"), Severity::Warning),
                Err(e) => self
                    .log
                    .record(&format!("{name}: send failed: {e}"), Severity::Error),
            }
        }
        None
    }

    async fn single(&mut self, name: &str, command: &'static [u8]) -> Option<Bytes> {
        match self
            .probe(command, self.config.probe_settle, self.config.read_timeout)
            .await
        {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                self.log
                    .record(&format!("{name}: no reply"), Severity::Warning);
                None
            }
            Err(e) => {
                self.log
                    .record(&format!("{name}: probe failed: {e}"), Severity::Error);
                None
            }
        }
    }

    async fn paper(&mut self) -> Option<PaperStatus> {
        let reply = self.single("paper status", diagnostic::STATUS_PAPER).await?;
        match parse_paper_status(&reply) {
            Ok(paper) => {
                self.log.record(
                    &format!(
                        "paper status: {} (paper: {}, near end: {})",
                        hex::encode(&paper.raw),
                        paper.has_paper,
                        paper.near_end
                    ),
                    Severity::Info,
                );
                Some(paper)
            }
            Err(e) => {
                self.log
                    .record(&format!("paper status: {e}"), Severity::Warning);
                None
            }
        }
    }

    async fn error(&mut self) -> Option<ErrorStatus> {
        let reply = self.single("error status", diagnostic::STATUS_ERROR).await?;
        match parse_error_status(&reply) {
            Ok(status) => {
                let severity = if status.has_error {
                    Severity::Error
                } else {
                    Severity::Success
                };
                self.log.record(
                    &format!("error status: {}", hex::encode(&status.raw)),
                    severity,
                );
                Some(status)
            }
            Err(e) => {
                self.log
                    .record(&format!("error status: {e}"), Severity::Warning);
                None
            }
        }
    }

    /// INIT plus a short line; succeeds if the write goes through.
    async fn quick_test(&mut self) -> bool {
        let mut frame = BytesMut::with_capacity(INIT.len() + 5);
        frame.put_slice(INIT);
        frame.put_slice(b"TEST\n");
        if self.transport.write(frame.freeze()).await.is_err() {
            return false;
        }
        self.sent = true;
        tokio::time::sleep(self.config.quick_test_settle).await;
        true
    }

    async fn recovery(&mut self) -> bool {
        self.log.record("Attempting recovery", Severity::Info);
        for (name, command) in RECOVERY_STEPS {
            self.log.record(&format!("Recovery: {name}"), Severity::Info);
            if let Err(e) = self.write(command).await {
                self.log
                    .record(&format!("Recovery step {name} failed: {e}"), Severity::Error);
                continue;
            }
            tokio::time::sleep(self.config.recovery_step_delay).await;
            if self.quick_test().await {
                self.log
                    .record(&format!("Recovered with {name}"), Severity::Success);
                return true;
            }
        }
        self.log.record("Recovery failed", Severity::Error);
        false
    }

    async fn emergency_reset(&mut self) -> Result<()> {
        self.write(diagnostic::CLEAR_BUFFER).await?;
        tokio::time::sleep(self.config.emergency_clear_delay).await;
        self.write(diagnostic::HARD_RESET).await?;
        tokio::time::sleep(self.config.emergency_reset_delay).await;
        self.write(diagnostic::INITIALIZE).await?;
        tokio::time::sleep(self.config.emergency_init_delay).await;
        Ok(())
    }
}

/// Derives findings from a diagnostic result.
#[must_use]
pub fn generate_recommendations(result: &DiagnosticResult) -> Vec<Recommendation> {
    use RecommendationLevel as Level;

    let mut found = Vec::new();

    if !result.connection_ok {
        found.push(Recommendation::new(
            Level::Critical,
            "Connection inactive",
            "Check that the printer is on and in range, then reconnect",
        ));
    }
    if !result.communication_ok {
        found.push(Recommendation::new(
            Level::Error,
            "The printer does not accept data",
            "Run recovery or restart the printer",
        ));
    }

    let status = result.printer_status.as_ref();
    match status {
        None => found.push(Recommendation::new(
            Level::Warning,
            "Printer status unreadable",
            "Many printers do not answer status requests; try a test print",
        )),
        Some(status) if !status.online => found.push(Recommendation::new(
            Level::Warning,
            "Printer reports offline",
            "Close the cover and check the power button",
        )),
        Some(_) => {}
    }

    let paper_missing = result.paper_status.as_ref().map_or_else(
        || status.is_some_and(|s| !s.paper_present),
        |paper| !paper.has_paper,
    );
    if paper_missing {
        found.push(Recommendation::new(
            Level::Error,
            "Paper missing or misloaded",
            "Reload the paper roll",
        ));
    } else if result.paper_status.as_ref().is_some_and(|p| p.near_end) {
        found.push(Recommendation::new(
            Level::Warning,
            "Paper roll nearly empty",
            "Prepare a new roll",
        ));
    }

    match &result.error_status {
        Some(error) if error.has_error => found.push(Recommendation::new(
            Level::Error,
            format!("Printer error reported (code 0x{:02x})", error.error_code),
            "Restart the printer and check the mechanism",
        )),
        None if status.is_some_and(|s| s.has_error) => found.push(Recommendation::new(
            Level::Error,
            "Printer error flag set",
            "Restart the printer and check the mechanism",
        )),
        _ => {}
    }

    match result.recovery {
        Some(true) => found.push(Recommendation::new(
            Level::Info,
            "Recovery succeeded",
            "Print a test page to confirm",
        )),
        Some(false) => found.push(Recommendation::new(
            Level::Error,
            "Recovery failed",
            "Try an emergency reset or power-cycle the printer",
        )),
        None => {}
    }

    let degraded = found.iter().any(|r| r.level >= Level::Warning);
    if !degraded && result.communication_ok && status.is_some() {
        found.push(Recommendation::new(
            Level::Success,
            "Printer ready",
            "No action needed",
        ));
    }

    found
}

/// Diagnostics engine bound to a [`ConnectionManager`].
pub struct PrinterDiagnostics<A: Adapter> {
    manager: ConnectionManager<A>,
    config: DiagnosticConfig,
    last: Mutex<Option<DiagnosticResult>>,
}

impl<A: Adapter> PrinterDiagnostics<A> {
    /// Creates an engine with default timings.
    #[must_use]
    pub fn new(manager: ConnectionManager<A>) -> Self {
        Self::with_config(manager, DiagnosticConfig::default())
    }

    /// Creates an engine with custom timings.
    #[must_use]
    pub const fn with_config(manager: ConnectionManager<A>, config: DiagnosticConfig) -> Self {
        Self {
            manager,
            config,
            last: Mutex::new(None),
        }
    }

    fn log(&self) -> Arc<dyn LogSink> {
        self.manager.log_sink()
    }

    /// The result of the last full diagnostic.
    #[must_use]
    pub fn last_result(&self) -> Option<DiagnosticResult> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status and paper probes with recommendations.
    pub async fn quick_diagnostic(&self) -> Result<DiagnosticResult> {
        let log = self.log();
        let mut transport = self.manager.transport().await?;
        let mut run = Run::new(&mut *transport, &self.config, log.as_ref());

        let mut result = DiagnosticResult {
            connection_ok: run.transport.is_connected(),
            printer_status: run.status(&STATUS_VARIANTS[..1]).await,
            ..DiagnosticResult::default()
        };
        result.paper_status = run.paper().await;
        result.communication_ok = run.sent;
        result.recommendations = generate_recommendations(&result);
        Ok(result)
    }

    /// Full pipeline: connection, communication, status, paper and error
    /// probes, recovery when communication failed or the error flag is set,
    /// then recommendations.
    pub async fn full_diagnostic(&self) -> Result<DiagnosticResult> {
        let log = self.log();
        log.record("Starting full diagnostic", Severity::Info);

        let mut transport = match self.manager.transport().await {
            Ok(transport) => transport,
            Err(e) => {
                log.record("No printer connected", Severity::Error);
                return Err(e);
            }
        };
        let mut run = Run::new(&mut *transport, &self.config, log.as_ref());

        let mut result = DiagnosticResult {
            connection_ok: run.connection(),
            ..DiagnosticResult::default()
        };
        result.communication_ok = run.communication().await;
        result.printer_status = run.status(&STATUS_VARIANTS).await;
        result.paper_status = run.paper().await;
        result.error_status = run.error().await;

        let error_flag = result.error_status.as_ref().is_some_and(|e| e.has_error);
        if !result.communication_ok || error_flag {
            result.recovery = Some(run.recovery().await);
        }
        drop(transport);

        result.recommendations = generate_recommendations(&result);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());

        log.record("Diagnostic finished", Severity::Success);
        Ok(result)
    }

    /// Returns true if the transport reports an open link.
    pub async fn test_connection(&self) -> bool {
        let log = self.log();
        match self.manager.transport().await {
            Ok(mut transport) => Run::new(&mut *transport, &self.config, log.as_ref()).connection(),
            Err(e) => {
                log.record(&format!("Connection test: {e}"), Severity::Error);
                false
            }
        }
    }

    /// Sends echo, ping and initialize probes; true if any reply arrived or
    /// any write succeeded.
    pub async fn test_basic_communication(&self) -> bool {
        let log = self.log();
        match self.manager.transport().await {
            Ok(mut transport) => {
                Run::new(&mut *transport, &self.config, log.as_ref())
                    .communication()
                    .await
            }
            Err(e) => {
                log.record(&format!("Communication test: {e}"), Severity::Error);
                false
            }
        }
    }

    /// Probes printer status, trying each status request variant.
    pub async fn check_printer_status(&self) -> Option<StatusBitfield> {
        let log = self.log();
        let mut transport = self.guard(log.as_ref()).await?;
        Run::new(&mut *transport, &self.config, log.as_ref())
            .status(&STATUS_VARIANTS)
            .await
    }

    /// Probes the paper sensor.
    pub async fn check_paper_status(&self) -> Option<PaperStatus> {
        let log = self.log();
        let mut transport = self.guard(log.as_ref()).await?;
        Run::new(&mut *transport, &self.config, log.as_ref())
            .paper()
            .await
    }

    /// Probes the error-cause status.
    pub async fn check_error_status(&self) -> Option<ErrorStatus> {
        let log = self.log();
        let mut transport = self.guard(log.as_ref()).await?;
        Run::new(&mut *transport, &self.config, log.as_ref())
            .error()
            .await
    }

    /// Staged recovery: clear buffer, soft reset, wake, initialize. Stops at
    /// the first step after which a test write goes through.
    pub async fn attempt_recovery(&self) -> bool {
        let log = self.log();
        let Some(mut transport) = self.guard(log.as_ref()).await else {
            return false;
        };
        Run::new(&mut *transport, &self.config, log.as_ref())
            .recovery()
            .await
    }

    /// Clear buffer, hard reset and initialize with fixed delays.
    pub async fn emergency_reset(&self) -> bool {
        let log = self.log();
        let Some(mut transport) = self.guard(log.as_ref()).await else {
            return false;
        };
        log.record("Emergency reset", Severity::Warning);
        match Run::new(&mut *transport, &self.config, log.as_ref())
            .emergency_reset()
            .await
        {
            Ok(()) => {
                log.record("Emergency reset complete", Severity::Success);
                true
            }
            Err(e) => {
                log.record(&format!("Emergency reset failed: {e}"), Severity::Error);
                false
            }
        }
    }

    /// Prints a diagnostic page.
    pub async fn force_print_test(&self) -> bool {
        let log = self.log();
        let Some(mut transport) = self.guard(log.as_ref()).await else {
            return false;
        };
        match transport.write(diagnostic_page_frame(current_timestamp())).await {
            Ok(()) => {
                log.record("Test page sent", Severity::Success);
                true
            }
            Err(e) => {
                log.record(&format!("Test page failed: {e}"), Severity::Error);
                false
            }
        }
    }

    async fn guard(
        &self,
        log: &dyn LogSink,
    ) -> Option<tokio::sync::MappedMutexGuard<'_, A::Transport>> {
        match self.manager.transport().await {
            Ok(transport) => Some(transport),
            Err(Error::NotConnected) => {
                log.record("No printer connected", Severity::Error);
                None
            }
            Err(e) => {
                log.record(&format!("Diagnostics unavailable: {e}"), Severity::Error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogBuffer;
    use crate::manager::ManagerConfig;
    use crate::transport::{MockAdapter, MockPeer};
    use crate::types::Device;
    use tokio::time::Instant;

    async fn connected() -> (
        MockPeer,
        ConnectionManager<MockAdapter>,
        PrinterDiagnostics<MockAdapter>,
        Arc<LogBuffer>,
    ) {
        let adapter = MockAdapter::new();
        let peer = adapter.add_device(Device::new("00:11:22:33:44:55"));
        let log = Arc::new(LogBuffer::new());
        let manager = ConnectionManager::with_config(
            adapter,
            ManagerConfig::new().smoke_test(false),
            log.clone(),
        );
        assert!(manager.connect(peer.device()).await);
        let diagnostics = PrinterDiagnostics::new(manager.clone());
        (peer, manager, diagnostics, log)
    }

    fn levels(result: &DiagnosticResult) -> Vec<RecommendationLevel> {
        result.recommendations.iter().map(|r| r.level).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_diagnostic_healthy() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        peer.push_response(vec![0x00]);
        peer.push_response(vec![0x00]);

        let result = diagnostics.quick_diagnostic().await.unwrap();

        assert!(result.connection_ok);
        assert!(result.communication_ok);
        assert!(result.printer_status.as_ref().unwrap().is_ready());
        assert!(result.paper_status.as_ref().unwrap().has_paper);
        assert_eq!(levels(&result), vec![RecommendationLevel::Success]);
        assert!(result.is_healthy());
        assert_eq!(
            peer.writes(),
            vec![
                Bytes::from_static(diagnostic::STATUS_PRINTER),
                Bytes::from_static(diagnostic::STATUS_PAPER)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_diagnostic_without_replies() {
        let (_peer, manager, diagnostics, _log) = connected().await;

        let result = diagnostics.quick_diagnostic().await.unwrap();

        assert!(result.printer_status.is_none());
        assert!(result.paper_status.is_none());
        assert!(result.communication_ok);
        assert_eq!(levels(&result), vec![RecommendationLevel::Warning]);
        assert!(result.recommendations[0].message.contains("unreadable"));
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_diagnostic_paper_missing() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        peer.push_response(vec![0x00]);
        peer.push_response(vec![0x60]);

        let result = diagnostics.quick_diagnostic().await.unwrap();

        assert_eq!(result.worst_level(), Some(RecommendationLevel::Error));
        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.message.contains("Paper missing"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics_require_connection() {
        let manager = ConnectionManager::with_config(
            MockAdapter::new(),
            ManagerConfig::new().smoke_test(false),
            Arc::new(LogBuffer::new()),
        );
        let diagnostics = PrinterDiagnostics::new(manager);

        assert!(matches!(
            diagnostics.quick_diagnostic().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            diagnostics.full_diagnostic().await,
            Err(Error::NotConnected)
        ));
        assert!(diagnostics.check_printer_status().await.is_none());
        assert!(!diagnostics.attempt_recovery().await);
        assert!(diagnostics.last_result().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_diagnostic_healthy() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        for reply in [0x01, 0x12, 0x00, 0x12] {
            peer.push_response(vec![reply]);
        }

        let result = diagnostics.full_diagnostic().await.unwrap();

        assert!(result.connection_ok);
        assert!(result.communication_ok);
        assert!(result.printer_status.is_some());
        assert!(!result.error_status.as_ref().unwrap().has_error);
        assert_eq!(result.recovery, None);
        assert_eq!(levels(&result), vec![RecommendationLevel::Success]);
        assert_eq!(diagnostics.last_result(), Some(result));
        assert_eq!(
            peer.writes(),
            vec![
                Bytes::from_static(diagnostic::ECHO_TEST),
                Bytes::from_static(diagnostic::STATUS_PRINTER),
                Bytes::from_static(diagnostic::STATUS_PAPER),
                Bytes::from_static(diagnostic::STATUS_ERROR),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_diagnostic_error_flag_runs_recovery() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        for reply in [0x01, 0x00, 0x00, 0x40] {
            peer.push_response(vec![reply]);
        }

        let result = diagnostics.full_diagnostic().await.unwrap();

        assert_eq!(result.error_status.as_ref().unwrap().error_code, 0x40);
        assert_eq!(result.recovery, Some(true));
        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.message.contains("code 0x40"))
        );
        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.level == RecommendationLevel::Info)
        );
        assert_eq!(peer.writes()[4], Bytes::from_static(diagnostic::CLEAR_BUFFER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_communication_tolerates_silence() {
        let (peer, _manager, diagnostics, log) = connected().await;

        assert!(diagnostics.test_basic_communication().await);
        assert_eq!(
            peer.writes(),
            vec![
                Bytes::from_static(diagnostic::ECHO_TEST),
                Bytes::from_static(diagnostic::PING),
                Bytes::from_static(diagnostic::INITIALIZE),
            ]
        );
        assert!(
            log.entries()
                .iter()
                .any(|e| e.message == "ping: sent, no reply")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_probe_tries_every_variant() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        peer.push_response(Vec::<u8>::new());

        assert!(diagnostics.check_printer_status().await.is_none());
        assert_eq!(peer.writes().len(), STATUS_VARIANTS.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_status_decodes_flag() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        peer.push_response(vec![0x40]);

        let status = diagnostics.check_error_status().await.unwrap();
        assert!(status.has_error);
        assert!(matches!(status.ensure(), Err(Error::DeviceError { code: 0x40 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_stops_at_first_step() {
        let (peer, _manager, diagnostics, _log) = connected().await;

        assert!(diagnostics.attempt_recovery().await);
        assert_eq!(
            peer.writes(),
            vec![
                Bytes::from_static(diagnostic::CLEAR_BUFFER),
                Bytes::from_static(b"\x1b@TEST\n"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_failure_keeps_connection() {
        let (peer, manager, diagnostics, log) = connected().await;
        peer.set_fail_writes(true);

        assert!(!diagnostics.attempt_recovery().await);
        assert!(manager.is_connected());
        assert_eq!(log.entries()[0].message, "Recovery failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_reset_sequence() {
        let (peer, _manager, diagnostics, _log) = connected().await;

        let start = Instant::now();
        assert!(diagnostics.emergency_reset().await);

        assert!(start.elapsed() >= Duration::from_millis(3500));
        assert_eq!(
            peer.writes(),
            vec![
                Bytes::from_static(diagnostic::CLEAR_BUFFER),
                Bytes::from_static(diagnostic::HARD_RESET),
                Bytes::from_static(diagnostic::INITIALIZE),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_print_test() {
        let (peer, _manager, diagnostics, _log) = connected().await;
        assert!(diagnostics.force_print_test().await);
        assert_eq!(peer.writes().len(), 1);
    }

    #[test]
    fn test_recommendations_without_connection() {
        let result = DiagnosticResult::default();
        let found = generate_recommendations(&result);

        assert_eq!(found[0].level, RecommendationLevel::Critical);
        assert_eq!(found[1].level, RecommendationLevel::Error);
        assert!(found.iter().all(|r| r.level != RecommendationLevel::Success));
    }

    #[test]
    fn test_recommendations_near_end_paper() {
        let result = DiagnosticResult {
            connection_ok: true,
            communication_ok: true,
            printer_status: Some(parse_status(&[0x00]).unwrap()),
            paper_status: Some(parse_paper_status(&[0x10]).unwrap()),
            ..DiagnosticResult::default()
        };
        let found = generate_recommendations(&result);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].level, RecommendationLevel::Warning);
    }
}
