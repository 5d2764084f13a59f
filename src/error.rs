//! Error types for the thermolink library.

use thiserror::Error;

/// The main error type for printer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error on the RFCOMM tty.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A print job could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The platform refused access to the radio or the device node.
    #[error("bluetooth permission denied")]
    PermissionDenied,

    /// No radio is present, or it could not be enabled.
    #[error("bluetooth radio unavailable")]
    RadioUnavailable,

    /// The connect attempt lost the race against its timeout.
    #[error("connection timed out after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Another connect attempt is already in flight.
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    /// A write or read on the link failed.
    #[error("communication failure: {message}")]
    CommunicationFailure { message: String },

    /// Malformed or unexpected response from the printer.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// No printer is connected.
    #[error("not connected")]
    NotConnected,

    /// The printer reports that paper is missing.
    #[error("paper out")]
    PaperOut,

    /// The printer asserted its error flag.
    #[error("printer reported error (code 0x{code:02x})")]
    DeviceError { code: u8 },
}

impl Error {
    /// Builds a [`Error::CommunicationFailure`] from anything printable.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationFailure {
            message: message.into(),
        }
    }
}

/// Encoder-specific errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// QR payload is empty.
    #[error("QR payload is empty")]
    EmptyPayload,

    /// QR payload exceeds what a single symbol can store.
    #[error("QR payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Result type alias for thermolink operations.
pub type Result<T> = std::result::Result<T, Error>;
