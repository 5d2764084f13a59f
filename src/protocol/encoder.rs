//! Print job encoding.
//!
//! Builds complete frames from print intents. A text frame always restores
//! the head state it changed, so the next frame starts from defaults:
//!
//! ```text
//! INIT, align?, bold-on?, size?, payload LF, bold-off?, size-reset?, ALIGN_LEFT, FEED
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;
use crate::protocol::command::{
    Align, CUT, Emphasis, FEED, INIT, LF, TextSize, qr,
};
use crate::types::{PrintOptions, QrOptions};

/// Line width used when wrapping descriptive text for narrow paper.
pub const DESCRIPTION_WIDTH: usize = 30;

const SEPARATOR: &[u8] = b"================================\n";

/// Fixed bytes a QR frame adds around its payload.
pub const QR_FRAME_OVERHEAD: usize = 3 // alignment
    + qr::MODEL_2.len()
    + qr::MODULE_SIZE.len() + 1
    + qr::ERROR_CORRECTION.len() + 1
    + qr::STORE.len() + 2 + qr::STORE_SUFFIX.len()
    + qr::PRINT.len()
    + FEED.len();

/// Appends `text` as single-byte characters.
///
/// Characters up to U+00FF map to their Latin-1 byte, anything else becomes `?`.
pub fn put_text(buf: &mut BytesMut, text: &str) {
    buf.reserve(text.len());
    for c in text.chars() {
        buf.put_u8(u8::try_from(u32::from(c)).unwrap_or(b'?'));
    }
}

/// Encodes one line of text with the given formatting.
#[must_use]
pub fn text_frame(text: &str, options: &PrintOptions) -> Bytes {
    let mut buf = BytesMut::with_capacity(INIT.len() + text.len() + 24);
    buf.put_slice(INIT);

    if options.align != Align::Left {
        buf.put_slice(&options.align.command());
    }
    if options.bold {
        buf.put_slice(&Emphasis::On.command());
    }
    if options.size != TextSize::Normal {
        buf.put_slice(&options.size.command());
    }

    put_text(&mut buf, text);
    buf.put_u8(LF);

    if options.bold {
        buf.put_slice(&Emphasis::Off.command());
    }
    if options.size != TextSize::Normal {
        buf.put_slice(&TextSize::Normal.command());
    }
    buf.put_slice(&Align::Left.command());
    buf.put_slice(FEED);

    buf.freeze()
}

/// Encodes a native QR symbol.
///
/// The store command length is `data.len() + 3`, little-endian.
///
/// # Errors
///
/// Returns an `EncodeError` if `data` is empty or larger than a model 2
/// symbol can hold. Nothing is truncated.
pub fn qr_frame(data: &[u8], options: &QrOptions) -> Result<Bytes, EncodeError> {
    if data.is_empty() {
        return Err(EncodeError::EmptyPayload);
    }
    if data.len() > qr::MAX_DATA_LEN {
        return Err(EncodeError::PayloadTooLarge {
            size: data.len(),
            max: qr::MAX_DATA_LEN,
        });
    }

    let module_size = options
        .module_size
        .clamp(qr::MIN_MODULE_SIZE, qr::MAX_MODULE_SIZE);
    // Fits: MAX_DATA_LEN + 3 < u16::MAX
    let store_len = (data.len() + qr::STORE_SUFFIX.len()) as u16;

    let mut buf = BytesMut::with_capacity(QR_FRAME_OVERHEAD + data.len());
    buf.put_slice(&options.align.command());
    buf.put_slice(qr::MODEL_2);
    buf.put_slice(qr::MODULE_SIZE);
    buf.put_u8(module_size);
    buf.put_slice(qr::ERROR_CORRECTION);
    buf.put_u8(options.error_correction as u8);
    buf.put_slice(&qr::STORE);
    buf.put_u16_le(store_len);
    buf.put_slice(&qr::STORE_SUFFIX);
    buf.put_slice(data);
    buf.put_slice(qr::PRINT);
    buf.put_slice(FEED);

    Ok(buf.freeze())
}

/// Feeds three lines.
#[must_use]
pub const fn feed_frame() -> Bytes {
    Bytes::from_static(FEED)
}

/// Cuts the paper.
#[must_use]
pub const fn cut_frame() -> Bytes {
    Bytes::from_static(CUT)
}

/// Short identification print sent right after connecting.
#[must_use]
pub fn identify_frame(label: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(INIT.len() + label.len() + 24);
    buf.put_slice(INIT);
    buf.put_slice(b"CONNECTION TEST\n");
    put_text(&mut buf, label);
    buf.put_u8(LF);
    buf.put_slice(FEED);
    buf.freeze()
}

/// Diagnostic test page stamped with a Unix timestamp.
#[must_use]
pub fn diagnostic_page_frame(timestamp: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_slice(INIT);
    buf.put_slice(&Align::Center.command());
    buf.put_slice(&Emphasis::On.command());
    buf.put_slice(b"DIAGNOSTIC TEST\n");
    buf.put_slice(&Emphasis::Off.command());
    buf.put_slice(&Align::Left.command());
    buf.put_slice(SEPARATOR);
    put_text(&mut buf, &format!("Time: {timestamp}\n"));
    buf.put_slice(b"Status: communication OK\n");
    buf.put_slice(SEPARATOR);
    buf.put_slice(FEED);
    buf.freeze()
}

/// Splits `text` into chunks of at most `width` characters.
///
/// A width of zero yields the whole text as one line.
#[must_use]
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_owned()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::ErrorCorrection;

    fn concat(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_text_frame_center_bold() {
        let options = PrintOptions::new().align(Align::Center).bold(true);
        let frame = text_frame("Bonjour", &options);

        let expected = concat(&[
            INIT,
            &[0x1B, 0x61, 0x01],
            &[0x1B, 0x45, 0x01],
            b"Bonjour\n",
            &[0x1B, 0x45, 0x00],
            &[0x1B, 0x61, 0x00],
            FEED,
        ]);
        assert_eq!(frame.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_text_frame_plain() {
        let frame = text_frame("hi", &PrintOptions::default());
        let expected = concat(&[INIT, b"hi\n", &[0x1B, 0x61, 0x00], FEED]);
        assert_eq!(frame.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_text_frame_size_reset() {
        let options = PrintOptions::new().size(TextSize::Large);
        let frame = text_frame("X", &options);
        let expected = concat(&[
            INIT,
            &[0x1D, 0x21, 0x22],
            b"X\n",
            &[0x1D, 0x21, 0x00],
            &[0x1B, 0x61, 0x00],
            FEED,
        ]);
        assert_eq!(frame.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_text_latin1() {
        let frame = text_frame("é€", &PrintOptions::default());
        assert_eq!(&frame[2..5], &[0xE9, b'?', b'\n']);
    }

    #[test]
    fn test_qr_length_prefix() {
        let data = vec![b'a'; 300];
        let frame = qr_frame(&data, &QrOptions::default()).unwrap();

        assert_eq!(frame.len(), QR_FRAME_OVERHEAD + data.len());

        let store_at = frame
            .windows(3)
            .position(|w| w == qr::STORE_SUFFIX)
            .unwrap()
            - 5;
        assert_eq!(&frame[store_at..store_at + 3], &qr::STORE);
        let len = u16::from_le_bytes([frame[store_at + 3], frame[store_at + 4]]);
        assert_eq!(len, 303);
    }

    #[test]
    fn test_qr_frame_layout() {
        let options = QrOptions::new()
            .module_size(4)
            .error_correction(ErrorCorrection::H)
            .align(Align::Center);
        let frame = qr_frame(b"hello", &options).unwrap();

        let expected = concat(&[
            &[0x1B, 0x61, 0x01],
            qr::MODEL_2,
            &[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, 0x04],
            &[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x51],
            &[0x1D, 0x28, 0x6B, 0x08, 0x00, 0x31, 0x50, 0x30],
            b"hello",
            qr::PRINT,
            FEED,
        ]);
        assert_eq!(frame.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_qr_module_size_clamped() {
        let frame = qr_frame(b"x", &QrOptions::new().module_size(0)).unwrap();
        assert_eq!(frame[3 + qr::MODEL_2.len() + 7], 1);

        let frame = qr_frame(b"x", &QrOptions::new().module_size(40)).unwrap();
        assert_eq!(frame[3 + qr::MODEL_2.len() + 7], 16);
    }

    #[test]
    fn test_qr_rejects_invalid_payloads() {
        assert_eq!(
            qr_frame(b"", &QrOptions::default()),
            Err(EncodeError::EmptyPayload)
        );

        let data = vec![b'1'; qr::MAX_DATA_LEN + 1];
        assert_eq!(
            qr_frame(&data, &QrOptions::default()),
            Err(EncodeError::PayloadTooLarge {
                size: qr::MAX_DATA_LEN + 1,
                max: qr::MAX_DATA_LEN
            })
        );

        let data = vec![b'1'; qr::MAX_DATA_LEN];
        assert!(qr_frame(&data, &QrOptions::default()).is_ok());
    }

    #[test]
    fn test_wrap_lines() {
        let text = "a".repeat(65);
        let lines = wrap_lines(&text, DESCRIPTION_WIDTH);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 30);
        assert_eq!(lines[2].len(), 5);

        assert_eq!(wrap_lines("short", 30), vec!["short".to_owned()]);
        assert!(wrap_lines("", 30).is_empty());
    }

    #[test]
    fn test_diagnostic_page_frame() {
        let frame = diagnostic_page_frame(1_700_000_000);
        assert!(frame.starts_with(&[0x1B, 0x40, 0x1B, 0x61, 0x01, 0x1B, 0x45, 0x01]));
        assert!(frame.ends_with(FEED));
        assert!(frame.windows(16).any(|w| w == b"Time: 1700000000"));
    }

    #[test]
    fn test_identify_frame() {
        let frame = identify_frame("MTP-II");
        assert!(frame.starts_with(INIT));
        assert!(frame.ends_with(FEED));
        assert!(frame.windows(6).any(|w| w == b"MTP-II"));
    }
}
