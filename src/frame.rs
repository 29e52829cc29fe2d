//! Wire frame layout and checksum.
//!
//! ```text
//! +-------------+---------------+------------------+------------+
//! | preamble(4) | length(2, LE) | payload(length)  | checksum(1)|
//! +-------------+---------------+------------------+------------+
//! ```
//!
//! The checksum is the XOR of every preceding byte. A receiver recomputes it
//! and reports disagreement; nothing is ever retransmitted.
//!
//! [`parse_frame`] trusts the length field. [`split_frame`] does not: when the
//! field disagrees with the bytes at hand it takes everything between the
//! header and the last byte as payload, so a frame whose length got corrupted
//! can still be inspected.

use crate::consts::{CHECKSUM_LEN, FRAME_OVERHEAD, LENGTH_LEN, PREAMBLE_LEN};
use crate::error::FrameError;

/// XOR-reduces a byte slice.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Computes the checksum of a frame from its parts.
///
/// Equivalent to `checksum(preamble ‖ len_le ‖ payload)` without building the
/// concatenation.
pub fn frame_checksum(preamble: &[u8; PREAMBLE_LEN], payload_len: u16, payload: &[u8]) -> u8 {
    checksum(preamble) ^ checksum(&payload_len.to_le_bytes()) ^ checksum(payload)
}

/// Total wire size of a frame carrying `payload_len` bytes.
pub const fn encoded_len(payload_len: usize) -> usize {
    payload_len + FRAME_OVERHEAD
}

/// Encapsulates `payload` into a wire frame written at the start of `out`.
///
/// # Returns
/// The number of bytes written.
///
/// # Errors
/// - [`FrameError::PayloadTooLong`] if the payload does not fit the length field
/// - [`FrameError::BufferTooSmall`] if `out` cannot hold the frame
pub fn encode_frame(
    preamble: &[u8; PREAMBLE_LEN],
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, FrameError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| FrameError::PayloadTooLong { len: payload.len() })?;
    let required = encoded_len(payload.len());
    if out.len() < required {
        return Err(FrameError::BufferTooSmall {
            required,
            actual: out.len(),
        });
    }

    let (head, rest) = out.split_at_mut(PREAMBLE_LEN);
    head.copy_from_slice(preamble);
    let (length, rest) = rest.split_at_mut(LENGTH_LEN);
    length.copy_from_slice(&len.to_le_bytes());
    let (body, rest) = rest.split_at_mut(payload.len());
    body.copy_from_slice(payload);
    rest[0] = frame_checksum(preamble, len, payload);

    Ok(required)
}

/// A decoded wire frame, borrowed from the byte sequence it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    /// The four preamble bytes, as received.
    pub preamble: [u8; PREAMBLE_LEN],
    /// Payload length declared in the header.
    pub declared_len: u16,
    /// The payload, sliced by the declared length.
    pub payload: &'a [u8],
    /// Checksum carried by the frame.
    pub stored_checksum: u8,
    /// Checksum recomputed over preamble, length and payload.
    pub computed_checksum: u8,
    /// Bytes found after the checksum (ignored).
    pub trailing: usize,
}

impl FrameView<'_> {
    /// Whether the stored checksum matches the recomputed one.
    pub fn checksum_ok(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }

    /// Whether the declared length accounts for exactly the bytes parsed.
    pub fn length_ok(&self) -> bool {
        usize::from(self.declared_len) == self.payload.len() && self.trailing == 0
    }
}

fn split_header(bytes: &[u8]) -> ([u8; PREAMBLE_LEN], u16) {
    let mut preamble = [0; PREAMBLE_LEN];
    preamble.copy_from_slice(&bytes[..PREAMBLE_LEN]);
    let declared_len = u16::from_le_bytes([bytes[PREAMBLE_LEN], bytes[PREAMBLE_LEN + 1]]);
    (preamble, declared_len)
}

/// Slices a decoded byte sequence into preamble, length, payload and checksum.
///
/// The checksum is reported, not enforced: a mismatch still yields a
/// [`FrameView`], see [`FrameView::checksum_ok`].
///
/// # Errors
/// [`FrameError::TooShort`] if `bytes` ends before the declared checksum.
pub fn parse_frame(bytes: &[u8]) -> Result<FrameView<'_>, FrameError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort {
            required: FRAME_OVERHEAD,
            actual: bytes.len(),
        });
    }

    let (preamble, declared_len) = split_header(bytes);

    let body_start = PREAMBLE_LEN + LENGTH_LEN;
    let body_end = body_start + declared_len as usize;
    let required = body_end + CHECKSUM_LEN;
    if bytes.len() < required {
        return Err(FrameError::TooShort {
            required,
            actual: bytes.len(),
        });
    }

    let payload = &bytes[body_start..body_end];
    Ok(FrameView {
        preamble,
        declared_len,
        payload,
        stored_checksum: bytes[body_end],
        computed_checksum: checksum(&bytes[..body_end]),
        trailing: bytes.len() - required,
    })
}

/// Like [`parse_frame`], but never fails over the length field.
///
/// If the declared length matches the bytes exactly, this is
/// [`parse_frame`]. Otherwise the payload is everything between the header
/// and the last byte, the last byte is taken as the checksum, and
/// [`FrameView::length_ok`] reports the disagreement.
///
/// # Errors
/// [`FrameError::TooShort`] if `bytes` cannot hold a header and checksum.
pub fn split_frame(bytes: &[u8]) -> Result<FrameView<'_>, FrameError> {
    match parse_frame(bytes) {
        Ok(view) if view.trailing == 0 => return Ok(view),
        Err(err) if bytes.len() < FRAME_OVERHEAD => return Err(err),
        _ => {}
    }

    let (preamble, declared_len) = split_header(bytes);
    let (body, chk) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    Ok(FrameView {
        preamble,
        declared_len,
        payload: &body[PREAMBLE_LEN + LENGTH_LEN..],
        stored_checksum: chk[0],
        computed_checksum: checksum(body),
        trailing: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_law_for_all_lengths() {
        let preamble = [0xaa, 0xbb, 0xcc, 0xdd];
        let mut buf = [0u8; 255 + FRAME_OVERHEAD];
        for len in 0..=255usize {
            let payload: [u8; 255] = core::array::from_fn(|i| (i * 31 + len) as u8);
            let payload = &payload[..len];
            let written = encode_frame(&preamble, payload, &mut buf).unwrap();
            assert_eq!(written, len + FRAME_OVERHEAD);

            let frame = &buf[..written];
            let (body, chk) = frame.split_at(written - 1);
            let expected = body.iter().fold(0u8, |acc, b| acc ^ b);
            assert_eq!(chk[0], expected, "payload length {len}");
        }
    }

    #[test]
    fn test_scenario_ok_frame() {
        let bytes = [0xaa, 0xbb, 0xcc, 0xdd, 0x02, 0x00, 0x4f, 0x4b, 0x00];
        let chk = 0xaa ^ 0xbb ^ 0xcc ^ 0xdd ^ 0x02 ^ 0x00 ^ 0x4f ^ 0x4b;
        let mut frame = bytes;
        frame[8] = chk;

        let view = parse_frame(&frame).unwrap();
        assert_eq!(view.preamble, [0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(view.declared_len, 2);
        assert_eq!(view.payload, b"OK");
        assert_eq!(view.stored_checksum, chk);
        assert_eq!(view.computed_checksum, chk);
        assert!(view.checksum_ok());
        assert_eq!(view.trailing, 0);
    }

    #[test]
    fn test_mismatch_is_reported_not_rejected() {
        let mut buf = [0u8; 16];
        let n = encode_frame(&[1, 2, 3, 4], b"hi", &mut buf).unwrap();
        buf[n - 1] ^= 0x80;

        let view = parse_frame(&buf[..n]).unwrap();
        assert!(!view.checksum_ok());
        assert_eq!(view.payload, b"hi");
        assert_eq!(view.stored_checksum ^ view.computed_checksum, 0x80);
    }

    #[test]
    fn test_short_frames_are_rejected() {
        assert_eq!(
            parse_frame(&[0; 6]),
            Err(FrameError::TooShort {
                required: FRAME_OVERHEAD,
                actual: 6
            })
        );
        // Declares 3 payload bytes, carries 1.
        assert_eq!(
            parse_frame(&[0, 0, 0, 0, 3, 0, 9, 9]),
            Err(FrameError::TooShort {
                required: 10,
                actual: 8
            })
        );
    }

    #[test]
    fn test_trailing_bytes_are_counted() {
        let mut buf = [0u8; 12];
        let n = encode_frame(&[0; 4], &[7], &mut buf).unwrap();
        let view = parse_frame(&buf[..n + 2]).unwrap();
        assert_eq!(view.payload, &[7u8]);
        assert_eq!(view.trailing, 2);
    }

    #[test]
    fn test_encode_rejects_small_buffer() {
        let mut buf = [0u8; 8];
        assert_eq!(
            encode_frame(&[0; 4], b"abc", &mut buf),
            Err(FrameError::BufferTooSmall {
                required: 10,
                actual: 8
            })
        );
    }

    #[test]
    fn test_split_frame_survives_a_bad_length() {
        // Declares 5 payload bytes, carries 2.
        let mut bytes = [0xaa, 0xbb, 0xcc, 0xdd, 0x05, 0x00, 0x4f, 0x4b, 0x00];
        bytes[8] = checksum(&bytes[..8]);
        assert!(parse_frame(&bytes).is_err());

        let view = split_frame(&bytes).unwrap();
        assert_eq!(view.declared_len, 5);
        assert_eq!(view.payload, b"OK");
        assert!(view.checksum_ok());
        assert!(!view.length_ok());
    }

    #[test]
    fn test_split_frame_with_short_length_takes_all_bytes() {
        // Declares 1 payload byte, carries 3.
        let mut bytes = [1, 2, 3, 4, 0x01, 0x00, 7, 8, 9, 0];
        bytes[9] = checksum(&bytes[..9]);
        let view = split_frame(&bytes).unwrap();
        assert_eq!(view.payload, &[7u8, 8, 9]);
        assert_eq!(view.trailing, 0);
        assert!(view.checksum_ok());
        assert!(!view.length_ok());
    }

    #[test]
    fn test_split_frame_matches_parse_frame_on_good_frames() {
        let mut buf = [0u8; 16];
        let n = encode_frame(&[9, 8, 7, 6], b"abc", &mut buf).unwrap();
        let view = split_frame(&buf[..n]).unwrap();
        assert_eq!(view, parse_frame(&buf[..n]).unwrap());
        assert!(view.length_ok());
        assert_eq!(
            split_frame(&buf[..6]),
            Err(FrameError::TooShort {
                required: FRAME_OVERHEAD,
                actual: 6
            })
        );
    }
}
