//! # thermolink
//!
//! A Rust client library for Bluetooth ESC/POS receipt printers.
//!
//! This library manages one RFCOMM connection to a bonded printer, encodes
//! print jobs into ESC/POS frames, watches the link, and can diagnose and
//! recover a printer that stops responding.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Debounced notification bus with replay for state observers
//! - Health watcher with heartbeat and connection-loss handling
//! - Status probes, staged recovery and emergency reset
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use thermolink::{
//!     Align, ConnectionManager, LogBuffer, ManagerConfig, PrintOptions, RfcommAdapter, Topic,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = Arc::new(LogBuffer::new());
//!     let manager = ConnectionManager::with_config(
//!         RfcommAdapter::default(),
//!         ManagerConfig::default(),
//!         log.clone(),
//!     );
//!
//!     let _status = manager.subscribe(Topic::Status, |value| println!("{value:?}"));
//!
//!     if !manager.initialize().await {
//!         return;
//!     }
//!     let Some(printer) = manager.devices().into_iter().find(|d| d.is_printer()) else {
//!         return;
//!     };
//!
//!     if manager.connect(&printer).await {
//!         let title = PrintOptions::new().align(Align::Center).bold(true);
//!         manager.print_text("Hello", &title).await;
//!         manager.feed_paper().await;
//!     }
//!     manager.shutdown().await;
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - ESC/POS command codes, frame encoding, status decoding
//! - [`types`] - Devices, connection state, print options, diagnostic reports
//! - [`transport`] - Transport and adapter traits (RFCOMM and mock backends)
//! - [`event`] - Topic-based notification bus
//! - [`logging`] - Log sink contract and in-memory history
//! - [`manager`] - The [`ConnectionManager`]
//! - [`diagnostics`] - [`PrinterDiagnostics`]

pub mod diagnostics;
pub mod error;
pub mod event;
pub mod logging;
pub mod manager;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use diagnostics::{DiagnosticConfig, PrinterDiagnostics, generate_recommendations};
pub use error::{EncodeError, Error, Result};
pub use event::{Notification, NotificationBus, Subscription, Topic};
pub use logging::{LogBuffer, LogEntry, LogSink, Severity, TracingSink};
pub use manager::{ConnectionManager, ManagerConfig};
pub use protocol::{Align, ErrorCorrection, TextSize};
pub use transport::{Adapter, RfcommAdapter, RfcommConfig, Transport};
pub use types::{
    ConnectionState, Device, DeviceInfo, DeviceKind, DiagnosticResult, ErrorStatus, PaperStatus,
    PrintOptions, QrOptions, Recommendation, RecommendationLevel, StatusBitfield,
};
