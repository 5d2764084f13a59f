//! Per-call print options.

use crate::protocol::command::{Align, ErrorCorrection, TextSize, qr};

/// Formatting for a text print call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintOptions {
    /// Justification.
    pub align: Align,
    /// Emphasis.
    pub bold: bool,
    /// Character size.
    pub size: TextSize,
}

impl PrintOptions {
    /// Left aligned, regular, normal size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            align: Align::Left,
            bold: false,
            size: TextSize::Normal,
        }
    }

    /// Sets the justification.
    #[must_use]
    pub const fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    /// Sets emphasis.
    #[must_use]
    pub const fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Sets the character size.
    #[must_use]
    pub const fn size(mut self, size: TextSize) -> Self {
        self.size = size;
        self
    }
}

/// Parameters for a native QR symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    /// Module size in dots (1-16). Out-of-range values are clamped by the encoder.
    pub module_size: u8,
    /// Error-correction level.
    pub error_correction: ErrorCorrection,
    /// Justification of the symbol.
    pub align: Align,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl QrOptions {
    /// Module size 8, level M, left aligned.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            module_size: qr::DEFAULT_MODULE_SIZE,
            error_correction: ErrorCorrection::M,
            align: Align::Left,
        }
    }

    /// Sets the module size.
    #[must_use]
    pub const fn module_size(mut self, size: u8) -> Self {
        self.module_size = size;
        self
    }

    /// Sets the error-correction level.
    #[must_use]
    pub const fn error_correction(mut self, level: ErrorCorrection) -> Self {
        self.error_correction = level;
        self
    }

    /// Sets the justification.
    #[must_use]
    pub const fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }
}
