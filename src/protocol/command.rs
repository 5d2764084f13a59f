//! ESC/POS command codes.
//!
//! Fixed commands are exposed as byte-slice constants. Commands that take a
//! single parameter byte are modelled as `repr(u8)` enums whose discriminant
//! is that parameter.

/// Escape, prefix of most formatting commands.
pub const ESC: u8 = 0x1B;
/// Group separator, prefix of size, cut and 2D-code commands.
pub const GS: u8 = 0x1D;
/// Data link escape, prefix of real-time status requests.
pub const DLE: u8 = 0x10;
/// Line feed.
pub const LF: u8 = 0x0A;

/// Initialize the printer (`ESC @`).
pub const INIT: &[u8] = &[ESC, 0x40];
/// Feed three lines (`ESC d 3`).
pub const FEED: &[u8] = &[ESC, 0x64, 0x03];
/// Full cut (`GS V 0`).
pub const CUT: &[u8] = &[GS, 0x56, 0x00];
/// Transmit printer status (`DLE EOT 1`).
pub const STATUS_CHECK: &[u8] = &[DLE, 0x04, 0x01];

/// Justification (`ESC a n`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Align {
    /// Left justified.
    #[default]
    Left = 0x00,
    /// Centered.
    Center = 0x01,
    /// Right justified.
    Right = 0x02,
}

impl Align {
    /// Returns the full `ESC a n` command.
    #[must_use]
    pub const fn command(self) -> [u8; 3] {
        [ESC, 0x61, self as u8]
    }
}

impl From<Align> for u8 {
    fn from(align: Align) -> Self {
        align as Self
    }
}

/// Emphasis (`ESC E n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Emphasis {
    /// Bold off.
    Off = 0x00,
    /// Bold on.
    On = 0x01,
}

impl Emphasis {
    /// Returns the full `ESC E n` command.
    #[must_use]
    pub const fn command(self) -> [u8; 3] {
        [ESC, 0x45, self as u8]
    }
}

/// Character size (`GS ! n`), width and height multipliers packed in a nibble each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextSize {
    /// 1x1.
    #[default]
    Normal = 0x00,
    /// 2x2.
    Double = 0x11,
    /// 3x3.
    Large = 0x22,
}

impl TextSize {
    /// Returns the full `GS ! n` command.
    #[must_use]
    pub const fn command(self) -> [u8; 3] {
        [GS, 0x21, self as u8]
    }
}

impl From<TextSize> for u8 {
    fn from(size: TextSize) -> Self {
        size as Self
    }
}

/// QR error-correction level (`GS ( k` function 169).
///
/// The level bytes are the ones this printer family answers to, not the
/// `0x30..=0x33` range of the Epson reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCorrection {
    /// ~7% recovery.
    L = 0x48,
    /// ~15% recovery.
    #[default]
    M = 0x49,
    /// ~25% recovery.
    Q = 0x50,
    /// ~30% recovery.
    H = 0x51,
}

impl ErrorCorrection {
    /// Parses a level name, case-insensitively. Anything unrecognized is `M`.
    #[must_use]
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_uppercase().as_str() {
            "L" => Self::L,
            "Q" => Self::Q,
            "H" => Self::H,
            _ => Self::M,
        }
    }
}

/// QR symbol commands (`GS ( k`, cn = 49).
pub mod qr {
    use super::GS;

    /// Store command header; the two length bytes follow.
    pub const STORE: [u8; 3] = [GS, 0x28, 0x6B];
    /// Select model 2 (function 165).
    pub const MODEL_2: &[u8] = &[GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00];
    /// Module size prefix (function 167); the size byte follows.
    pub const MODULE_SIZE: &[u8] = &[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43];
    /// Error correction prefix (function 169); the level byte follows.
    pub const ERROR_CORRECTION: &[u8] = &[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45];
    /// Bytes following the length in the store command (function 180).
    pub const STORE_SUFFIX: [u8; 3] = [0x31, 0x50, 0x30];
    /// Print the stored symbol (function 181).
    pub const PRINT: &[u8] = &[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30];

    /// Smallest module size in dots.
    pub const MIN_MODULE_SIZE: u8 = 1;
    /// Largest module size in dots.
    pub const MAX_MODULE_SIZE: u8 = 16;
    /// Default module size in dots.
    pub const DEFAULT_MODULE_SIZE: u8 = 8;
    /// Largest payload a model 2 symbol can store (numeric mode, version 40).
    pub const MAX_DATA_LEN: usize = 7089;
}

/// Probe and recovery commands used by the diagnostics engine.
pub mod diagnostic {
    use super::{DLE, ESC, GS};

    /// Printer status (`DLE EOT 1`).
    pub const STATUS_PRINTER: &[u8] = super::STATUS_CHECK;
    /// Error cause status (`DLE EOT 3`).
    pub const STATUS_ERROR: &[u8] = &[DLE, 0x04, 0x03];
    /// Paper sensor status (`DLE EOT 4`).
    pub const STATUS_PAPER: &[u8] = &[DLE, 0x04, 0x04];
    /// Real-time status used by many clone firmwares (`GS r 1`).
    pub const STATUS_REAL_TIME: &[u8] = &[GS, 0x72, 0x01];
    /// Transmit status (`GS r 2`).
    pub const STATUS_TRANSMIT: &[u8] = &[GS, 0x72, 0x02];

    /// Soft reset, same as initialize.
    pub const SOFT_RESET: &[u8] = &[ESC, 0x40];
    /// Hard reset.
    pub const HARD_RESET: &[u8] = &[ESC, 0x3F, 0x0A, 0x00];
    /// Cancel, drops the input buffer.
    pub const CLEAR_BUFFER: &[u8] = &[0x18];
    /// Select peripheral device, wakes sleeping printers.
    pub const WAKE_UP: &[u8] = &[ESC, 0x3D, 0x01];
    /// Initialize and select code page 0.
    pub const INITIALIZE: &[u8] = &[ESC, 0x40, ESC, 0x74, 0x00];

    /// Plain-text echo probe.
    pub const ECHO_TEST: &[u8] = b"ECHO_TEST\n";
    /// Enquiry.
    pub const PING: &[u8] = &[0x05];
}
