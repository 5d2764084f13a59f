//! Printer status and diagnostic report types.

use crate::error::{Error, Result};

/// Decoded printer status byte.
///
/// Bit 3 set means offline, bits 5-6 flag a paper problem, bit 6 is the
/// error flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBitfield {
    /// Raw response bytes.
    pub raw: Vec<u8>,
    /// Printer is online.
    pub online: bool,
    /// Paper is present.
    pub paper_present: bool,
    /// Error flag asserted.
    pub has_error: bool,
}

impl StatusBitfield {
    /// Returns true if the printer is online with paper and no error.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.online && self.paper_present && !self.has_error
    }
}

/// Decoded paper sensor byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperStatus {
    /// Raw response bytes.
    pub raw: Vec<u8>,
    /// Paper is present.
    pub has_paper: bool,
    /// Roll is near its end.
    pub near_end: bool,
}

impl PaperStatus {
    /// Fails with [`Error::PaperOut`] when no paper is detected.
    pub const fn ensure(&self) -> Result<()> {
        if self.has_paper {
            Ok(())
        } else {
            Err(Error::PaperOut)
        }
    }
}

/// Decoded error-cause byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatus {
    /// Raw response bytes.
    pub raw: Vec<u8>,
    /// Error flag asserted.
    pub has_error: bool,
    /// The first response byte.
    pub error_code: u8,
}

impl ErrorStatus {
    /// Fails with [`Error::DeviceError`] when the error flag is set.
    pub const fn ensure(&self) -> Result<()> {
        if self.has_error {
            Err(Error::DeviceError {
                code: self.error_code,
            })
        } else {
            Ok(())
        }
    }
}

/// Severity of a recommendation, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecommendationLevel {
    /// Everything works.
    Success,
    /// Informational.
    Info,
    /// Degraded but usable.
    Warning,
    /// Printing will likely fail.
    Error,
    /// No link.
    Critical,
}

/// A human-readable finding with a suggested action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    /// Severity.
    pub level: RecommendationLevel,
    /// What was found.
    pub message: String,
    /// What to do about it.
    pub action: String,
}

impl Recommendation {
    /// Creates a recommendation.
    pub fn new(
        level: RecommendationLevel,
        message: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            action: action.into(),
        }
    }
}

/// Outcome of a diagnostic run.
///
/// `None` in a status field means the probe got no usable answer, which is
/// common for write-only printers and is not a failure in itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticResult {
    /// The transport reports an open link.
    pub connection_ok: bool,
    /// At least one probe could be written.
    pub communication_ok: bool,
    /// Printer status probe.
    pub printer_status: Option<StatusBitfield>,
    /// Paper probe.
    pub paper_status: Option<PaperStatus>,
    /// Error-cause probe.
    pub error_status: Option<ErrorStatus>,
    /// `Some(recovered)` if a recovery sequence ran.
    pub recovery: Option<bool>,
    /// Findings, most relevant first.
    pub recommendations: Vec<Recommendation>,
}

impl DiagnosticResult {
    /// Returns the most severe recommendation level, if any.
    #[must_use]
    pub fn worst_level(&self) -> Option<RecommendationLevel> {
        self.recommendations.iter().map(|r| r.level).max()
    }

    /// Returns true if no recommendation is a warning or worse.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.worst_level()
            .is_none_or(|level| level < RecommendationLevel::Warning)
    }
}
