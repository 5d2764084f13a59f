//! Data types for printer entities.
//!
//! This module contains the core data structures used throughout the library:
//! - Devices and connection state
//! - Print options
//! - Status bitfields and diagnostic reports

pub mod device;
pub mod diagnostic;
pub mod options;

pub use device::{ConnectionState, Device, DeviceInfo, DeviceKind};
pub use diagnostic::{
    DiagnosticResult, ErrorStatus, PaperStatus, Recommendation, RecommendationLevel,
    StatusBitfield,
};
pub use options::{PrintOptions, QrOptions};
