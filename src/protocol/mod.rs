//! ESC/POS protocol definitions.
//!
//! This module contains the low-level protocol pieces:
//! - Command codes and parameter enums
//! - Frame encoding for text, QR symbols, feed and cut
//! - Status response decoding

pub mod command;
pub mod encoder;
pub mod status;

pub use command::{Align, Emphasis, ErrorCorrection, TextSize};
pub use encoder::{
    DESCRIPTION_WIDTH, QR_FRAME_OVERHEAD, cut_frame, diagnostic_page_frame, feed_frame,
    identify_frame, qr_frame, text_frame, wrap_lines,
};
pub use status::{parse_error_status, parse_paper_status, parse_status};
