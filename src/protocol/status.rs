//! Decoders for real-time status responses.
//!
//! Every decoder looks at the first response byte only. An empty response is
//! a protocol error; "no response at all" never reaches these functions.

use crate::error::{Error, Result};
use crate::types::{ErrorStatus, PaperStatus, StatusBitfield};

const OFFLINE_BIT: u8 = 0x08;
const PAPER_MASK: u8 = 0x60;
const NEAR_END_MASK: u8 = 0x30;
const ERROR_BIT: u8 = 0x40;

fn first_byte(response: &[u8]) -> Result<u8> {
    response.first().copied().ok_or_else(|| Error::Protocol {
        message: "empty status response".into(),
    })
}

/// Decodes a printer status response.
pub fn parse_status(response: &[u8]) -> Result<StatusBitfield> {
    let byte = first_byte(response)?;
    Ok(StatusBitfield {
        raw: response.to_vec(),
        online: byte & OFFLINE_BIT == 0,
        paper_present: byte & PAPER_MASK == 0,
        has_error: byte & ERROR_BIT != 0,
    })
}

/// Decodes a paper sensor response.
pub fn parse_paper_status(response: &[u8]) -> Result<PaperStatus> {
    let byte = first_byte(response)?;
    Ok(PaperStatus {
        raw: response.to_vec(),
        has_paper: byte & PAPER_MASK == 0,
        near_end: byte & NEAR_END_MASK != 0,
    })
}

/// Decodes an error-cause response.
pub fn parse_error_status(response: &[u8]) -> Result<ErrorStatus> {
    let byte = first_byte(response)?;
    Ok(ErrorStatus {
        raw: response.to_vec(),
        has_error: byte & ERROR_BIT != 0,
        error_code: byte,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_healthy() {
        let status = parse_status(&[0x00]).unwrap();
        assert!(status.online);
        assert!(status.paper_present);
        assert!(!status.has_error);
        assert!(status.is_ready());
    }

    #[test]
    fn test_parse_status_error_bit() {
        let status = parse_status(&[0x40]).unwrap();
        assert!(status.has_error);
        // Bit 6 is inside the paper mask as well
        assert!(!status.paper_present);
        assert!(status.online);
    }

    #[test]
    fn test_parse_status_offline() {
        let status = parse_status(&[0x08, 0xFF]).unwrap();
        assert!(!status.online);
        assert!(status.paper_present);
        assert_eq!(status.raw, vec![0x08, 0xFF]);
    }

    #[test]
    fn test_parse_status_empty() {
        assert!(matches!(parse_status(&[]), Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_parse_paper_status() {
        let status = parse_paper_status(&[0x12]).unwrap();
        assert!(status.has_paper);
        assert!(status.near_end);

        let status = parse_paper_status(&[0x60]).unwrap();
        assert!(!status.has_paper);
    }

    #[test]
    fn test_parse_error_status() {
        let status = parse_error_status(&[0x42]).unwrap();
        assert!(status.has_error);
        assert_eq!(status.error_code, 0x42);

        let status = parse_error_status(&[0x12]).unwrap();
        assert!(!status.has_error);
    }
}
