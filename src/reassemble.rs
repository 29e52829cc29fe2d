//! Offline reassembly of oversampled frame captures.
//!
//! A capture is the raw output of a logic sampler watching a single-lane
//! link: a string of `'0'`/`'1'` characters, `samples_per_bit` characters per
//! transmitted bit. [`Reassembler::reassemble`] turns it back into a frame in
//! four stages:
//!
//! 1. **clean**: collapse each run of `samples_per_bit` samples into one bit,
//!    keeping only runs where every sample agrees
//! 2. **symbolize**: cut the bits into 6-bit windows and decode each through
//!    the constant-weight alphabet in [`crate::encoding`]
//! 3. **assemble**: pair nibbles `(low, high)` into bytes
//! 4. **validate**: split the bytes with [`split_frame`] and compare checksums
//!
//! A capture that does not start on a frame boundary, or whose samples are
//! noisy within a bit, goes through [`Reassembler::find_frame`] instead: it
//! votes each bit from its samples and slides one sample at a time until the
//! preamble decodes.
//!
//! [`Reassembler::encode_capture`] goes the other way and produces a clean
//! capture of a frame.
//!
//! ```rust
//! use ask4lane::reassemble::Reassembler;
//!
//! let reassembler = Reassembler::default();
//! let capture = reassembler.encode_payload(b"OK")?;
//! let frame = reassembler.reassemble(&capture)?;
//! assert_eq!(frame.text(), "OK");
//! assert!(frame.checksum_ok());
//! # Ok::<(), ask4lane::error::DecodeError>(())
//! ```

use crate::consts::{
    CHECKSUM_LEN, FRAME_OVERHEAD, FRAME_PREAMBLE, LENGTH_LEN, PREAMBLE_LEN, SAMPLES_PER_BIT,
    SYMBOL_BITS,
};
use crate::encoding::{decode_window, encode_byte};
use crate::error::{DecodeError, FrameError};
use crate::frame::{encode_frame, encoded_len, split_frame};

/// Decodes oversampled captures into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassembler {
    samples_per_bit: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(SAMPLES_PER_BIT)
    }
}

/// A frame recovered from a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembly {
    /// The cleaned bitstream, one `'0'`/`'1'` per bit.
    pub bits: String,
    /// Every decoded byte, header and checksum included.
    pub bytes: Vec<u8>,
    /// The preamble as captured.
    pub preamble: [u8; PREAMBLE_LEN],
    /// Payload length declared in the header.
    pub declared_len: u16,
    /// The payload.
    pub payload: Vec<u8>,
    /// Checksum carried by the frame.
    pub stored_checksum: u8,
    /// Checksum recomputed from the decoded bytes.
    pub computed_checksum: u8,
    /// Whether the declared length matches the bytes decoded. When it does
    /// not, `payload` is everything between the header and the last byte.
    pub length_ok: bool,
}

impl Reassembly {
    fn from_bytes(bits: String, bytes: Vec<u8>) -> Result<Self, FrameError> {
        let view = split_frame(&bytes)?;
        if !view.checksum_ok() {
            info!(
                "reassemble: checksum mismatch (stored {}, computed {})",
                view.stored_checksum,
                view.computed_checksum
            );
        }
        if !view.length_ok() {
            warn!(
                "reassemble: length field says {} bytes, frame carries {}",
                view.declared_len,
                view.payload.len()
            );
        }
        Ok(Self {
            preamble: view.preamble,
            declared_len: view.declared_len,
            payload: view.payload.to_vec(),
            stored_checksum: view.stored_checksum,
            computed_checksum: view.computed_checksum,
            length_ok: view.length_ok(),
            bits,
            bytes,
        })
    }

    /// The cleaned bitstream.
    pub fn bitstream(&self) -> &str {
        &self.bits
    }

    /// The payload with every byte mapped to the code point of the same value.
    pub fn text(&self) -> String {
        self.payload.iter().copied().map(char::from).collect()
    }

    /// Whether the stored checksum matches the recomputed one.
    pub fn checksum_ok(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}

impl Reassembler {
    /// Creates a reassembler for captures with `samples_per_bit` samples per
    /// bit (at least 1).
    pub fn new(samples_per_bit: usize) -> Self {
        Self {
            samples_per_bit: samples_per_bit.max(1),
        }
    }

    /// Samples per transmitted bit.
    pub fn samples_per_bit(&self) -> usize {
        self.samples_per_bit
    }

    /// Collapses a raw capture into a bitstream.
    ///
    /// Whitespace is skipped. A run whose samples disagree is dropped, as is
    /// a partial run at the end.
    ///
    /// # Errors
    /// [`DecodeError::InvalidSample`] for any character other than `'0'`,
    /// `'1'` or whitespace.
    pub fn clean(&self, capture: &str) -> Result<String, DecodeError> {
        let samples = self.samples(capture)?;
        let runs = samples.chunks_exact(self.samples_per_bit);
        let leftover = runs.remainder().len();

        let mut dropped = 0usize;
        let bits: String = runs
            .filter_map(|run| {
                let uniform = run.iter().all(|&s| s == run[0]);
                if !uniform {
                    dropped += 1;
                }
                uniform.then_some(if run[0] { '1' } else { '0' })
            })
            .collect();

        if dropped > 0 {
            debug!("clean: dropped {} non-uniform runs", dropped);
        }
        if leftover > 0 {
            trace!("clean: discarded {} trailing samples", leftover);
        }
        Ok(bits)
    }

    /// Reads the samples of a capture, skipping whitespace.
    fn samples(&self, capture: &str) -> Result<Vec<bool>, DecodeError> {
        capture
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(position, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                found => Err(DecodeError::InvalidSample { position, found }),
            })
            .collect()
    }

    /// Decodes a cleaned bitstream into nibbles, one per 6-bit window.
    ///
    /// # Errors
    /// - [`DecodeError::UnmappedSymbol`] for a window outside the alphabet
    /// - [`DecodeError::TrailingBits`] if the stream does not end on a window
    ///   boundary
    pub fn symbolize(&self, bits: &str) -> Result<Vec<u8>, DecodeError> {
        let bits = bits.as_bytes();
        let windows = bits.chunks_exact(SYMBOL_BITS);
        let rest = windows.remainder().len();
        if rest != 0 {
            return Err(DecodeError::TrailingBits { count: rest });
        }

        windows
            .enumerate()
            .map(|(index, chunk)| {
                let window = chunk
                    .iter()
                    .fold(0u8, |acc, &b| (acc << 1) | u8::from(b == b'1'));
                decode_window(window).ok_or(DecodeError::UnmappedSymbol { index, window })
            })
            .collect()
    }

    /// Pairs nibbles `(low, high)` into bytes.
    ///
    /// # Errors
    /// [`DecodeError::OddNibbleCount`] if a nibble is left over.
    pub fn assemble(&self, nibbles: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let pairs = nibbles.chunks_exact(2);
        if !pairs.remainder().is_empty() {
            return Err(DecodeError::OddNibbleCount {
                count: nibbles.len(),
            });
        }
        Ok(pairs.map(|pair| pair[0] | (pair[1] << 4)).collect())
    }

    /// Runs the whole pipeline on a raw capture.
    ///
    /// Neither a checksum mismatch nor a length field that disagrees with the
    /// decoded bytes is an error; check [`Reassembly::checksum_ok`] and
    /// [`Reassembly::length_ok`].
    ///
    /// # Errors
    /// Any [`DecodeError`] raised by a stage, or [`DecodeError::Frame`] if
    /// fewer bytes were decoded than a header and checksum take.
    pub fn reassemble(&self, capture: &str) -> Result<Reassembly, DecodeError> {
        let bits = self.clean(capture)?;
        let nibbles = self.symbolize(&bits)?;
        let bytes = self.assemble(&nibbles)?;
        Reassembly::from_bytes(bits, bytes).map_err(DecodeError::from)
    }

    /// Searches a capture for the first frame that opens with `preamble`.
    ///
    /// Unlike [`reassemble`](Self::reassemble), the capture may start
    /// anywhere and bits need not be clean: each bit is voted from its
    /// samples (at least five in eight must be `'1'` for a one), and every
    /// sample offset is tried until the preamble decodes. The length field is
    /// then trusted to find the checksum, so anything after the frame is
    /// ignored. A candidate that hits an unmapped symbol is abandoned and the
    /// search goes on.
    ///
    /// # Returns
    /// The frame, with `bits` holding its voted bitstream, or `None` if no
    /// complete frame was found.
    ///
    /// # Errors
    /// [`DecodeError::InvalidSample`] for any character other than `'0'`,
    /// `'1'` or whitespace.
    pub fn find_frame(
        &self,
        capture: &str,
        preamble: &[u8; PREAMBLE_LEN],
    ) -> Result<Option<Reassembly>, DecodeError> {
        let samples = self.samples(capture)?;
        let min_samples = FRAME_OVERHEAD * 2 * SYMBOL_BITS * self.samples_per_bit;
        if samples.len() < min_samples {
            return Ok(None);
        }
        for start in 0..=samples.len() - min_samples {
            if let Some(frame) = self.frame_at(&samples, start, preamble) {
                debug!("scan: frame at sample {}", start);
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn frame_at(
        &self,
        samples: &[bool],
        start: usize,
        preamble: &[u8; PREAMBLE_LEN],
    ) -> Option<Reassembly> {
        let mut cursor = VotingCursor {
            samples,
            pos: start,
            samples_per_bit: self.samples_per_bit,
            bits: String::new(),
        };
        let mut bytes = Vec::with_capacity(FRAME_OVERHEAD);
        for &expected in preamble {
            let byte = cursor.next_byte()?;
            if byte != expected {
                return None;
            }
            bytes.push(byte);
        }
        for _ in 0..LENGTH_LEN {
            bytes.push(cursor.next_byte()?);
        }
        let declared_len = u16::from_le_bytes([bytes[PREAMBLE_LEN], bytes[PREAMBLE_LEN + 1]]);
        for _ in 0..usize::from(declared_len) + CHECKSUM_LEN {
            bytes.push(cursor.next_byte()?);
        }
        Reassembly::from_bytes(cursor.bits, bytes).ok()
    }

    /// Produces a clean capture of the frame carrying `payload`.
    ///
    /// # Errors
    /// [`FrameError::PayloadTooLong`] if the payload overflows the length field.
    pub fn encode_capture(
        &self,
        preamble: &[u8; PREAMBLE_LEN],
        payload: &[u8],
    ) -> Result<String, FrameError> {
        let mut frame = vec![0; encoded_len(payload.len())];
        let n = encode_frame(preamble, payload, &mut frame)?;

        let bits_per_byte = 2 * SYMBOL_BITS;
        let mut capture = String::with_capacity(n * bits_per_byte * self.samples_per_bit);
        for &byte in &frame[..n] {
            for sym in encode_byte(byte) {
                for i in 0..SYMBOL_BITS {
                    let sample = if (sym >> i) & 1 == 1 { '1' } else { '0' };
                    capture.extend(core::iter::repeat_n(sample, self.samples_per_bit));
                }
            }
        }
        Ok(capture)
    }

    /// [`encode_capture`](Self::encode_capture) with [`FRAME_PREAMBLE`].
    ///
    /// # Errors
    /// [`FrameError::PayloadTooLong`] if the payload overflows the length field.
    pub fn encode_payload(&self, payload: &[u8]) -> Result<String, FrameError> {
        self.encode_capture(&FRAME_PREAMBLE, payload)
    }
}

/// Walks a sample buffer one voted bit at a time.
struct VotingCursor<'a> {
    samples: &'a [bool],
    pos: usize,
    samples_per_bit: usize,
    bits: String,
}

impl VotingCursor<'_> {
    fn next_bit(&mut self) -> Option<bool> {
        let run = self.samples.get(self.pos..self.pos + self.samples_per_bit)?;
        self.pos += self.samples_per_bit;
        let ones = run.iter().filter(|&&s| s).count();
        let bit = ones * 8 >= self.samples_per_bit * 5;
        self.bits.push(if bit { '1' } else { '0' });
        Some(bit)
    }

    /// Two symbols, low nibble first. `None` if the samples run out or a
    /// symbol does not decode.
    fn next_byte(&mut self) -> Option<u8> {
        let mut nibbles = [0u8; 2];
        for nibble in &mut nibbles {
            let mut window = 0u8;
            for _ in 0..SYMBOL_BITS {
                window = (window << 1) | u8::from(self.next_bit()?);
            }
            *nibble = decode_window(window)?;
        }
        Some(nibbles[0] | (nibbles[1] << 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::SYMBOLS;

    /// Oversamples `bytes` by hand, straight from the symbol table.
    fn capture_of(bytes: &[u8]) -> String {
        let mut out = String::new();
        for &byte in bytes {
            for nibble in [byte & 0x0f, byte >> 4] {
                let sym = SYMBOLS[nibble as usize];
                for i in 0..6 {
                    let c = if sym & (1 << i) != 0 { "11111111" } else { "00000000" };
                    out.push_str(c);
                }
            }
        }
        out
    }

    fn scenario_bytes() -> Vec<u8> {
        let mut bytes = vec![0xaa, 0xbb, 0xcc, 0xdd, 0x02, 0x00, 0x4f, 0x4b];
        bytes.push(bytes.iter().fold(0u8, |acc, b| acc ^ b));
        bytes
    }

    #[test]
    fn test_scenario_ok_capture() {
        let bytes = scenario_bytes();
        let frame = Reassembler::default().reassemble(&capture_of(&bytes)).unwrap();
        assert_eq!(frame.bytes, bytes);
        assert_eq!(frame.bits.len(), bytes.len() * 12);
        assert_eq!(frame.preamble, [0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(frame.declared_len, 2);
        assert_eq!(frame.text(), "OK");
        assert_eq!(frame.stored_checksum, bytes[8]);
        assert_eq!(frame.computed_checksum, bytes[8]);
        assert!(frame.checksum_ok());
        assert_eq!(format!("{:?}", frame.bytes), "[170, 187, 204, 221, 2, 0, 79, 75, 6]");
    }

    #[test]
    fn test_checksum_mismatch_still_returns_payload() {
        let mut bytes = scenario_bytes();
        bytes[8] ^= 0x01;
        let frame = Reassembler::default().reassemble(&capture_of(&bytes)).unwrap();
        assert_eq!(frame.text(), "OK");
        assert!(!frame.checksum_ok());
        assert_eq!(frame.stored_checksum ^ frame.computed_checksum, 0x01);
    }

    #[test]
    fn test_non_uniform_runs_are_dropped() {
        let clean = capture_of(&scenario_bytes());
        let mut noisy = String::new();
        for (i, run) in clean.as_bytes().chunks(8).enumerate() {
            noisy.push_str(core::str::from_utf8(run).unwrap());
            if i % 5 == 0 {
                noisy.push_str("00011011");
            }
        }
        let r = Reassembler::default();
        assert_eq!(r.clean(&noisy).unwrap(), r.clean(&clean).unwrap());
        assert_eq!(r.reassemble(&noisy).unwrap().text(), "OK");
    }

    #[test]
    fn test_whitespace_and_partial_run_are_ignored() {
        let r = Reassembler::default();
        assert_eq!(r.clean("0000 0000\n11111111\t1111").unwrap(), "01");
    }

    #[test]
    fn test_invalid_sample() {
        assert_eq!(
            Reassembler::default().clean("0000000x"),
            Err(DecodeError::InvalidSample {
                position: 7,
                found: 'x'
            })
        );
    }

    #[test]
    fn test_unmapped_symbol_is_rejected() {
        let r = Reassembler::default();
        // 0b000111 reversed is 0b111000, one of the four unused patterns.
        let bits = r.clean(&capture_of(&[0x12])).unwrap() + "000111";
        assert_eq!(
            r.symbolize(&bits),
            Err(DecodeError::UnmappedSymbol {
                index: 2,
                window: 0b000111
            })
        );
    }

    #[test]
    fn test_trailing_bits_and_odd_nibbles() {
        let r = Reassembler::new(1);
        assert_eq!(r.symbolize("1011001"), Err(DecodeError::TrailingBits { count: 1 }));
        assert_eq!(r.assemble(&[1, 2, 3]), Err(DecodeError::OddNibbleCount { count: 3 }));
        assert_eq!(r.assemble(&[0xf, 0x4]).unwrap(), vec![0x4f]);
    }

    #[test]
    fn test_short_capture_is_a_frame_error() {
        let err = Reassembler::default()
            .reassemble(&capture_of(&[0xaa, 0xbb]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Frame(FrameError::TooShort { .. })));
    }

    #[test]
    fn test_encode_capture_matches_hand_encoding() {
        let r = Reassembler::default();
        let payload = [0x4f, 0x4b];
        let capture = r.encode_capture(&[0xaa, 0xbb, 0xcc, 0xdd], &payload).unwrap();
        assert_eq!(capture, capture_of(&scenario_bytes()));
    }

    #[test]
    fn test_encode_then_reassemble() {
        for spb in [1, 3, 8] {
            let r = Reassembler::new(spb);
            let payload: Vec<u8> = (0..=255).collect();
            let frame = r.reassemble(&r.encode_payload(&payload).unwrap()).unwrap();
            assert_eq!(frame.preamble, FRAME_PREAMBLE);
            assert_eq!(frame.payload, payload);
            assert!(frame.checksum_ok(), "samples per bit {spb}");
        }
    }

    #[test]
    fn test_bad_length_field_is_reported_not_rejected() {
        let mut bytes = vec![0xaa, 0xbb, 0xcc, 0xdd, 0x05, 0x00, 0x4f, 0x4b];
        bytes.push(bytes.iter().fold(0u8, |acc, b| acc ^ b));
        let frame = Reassembler::default().reassemble(&capture_of(&bytes)).unwrap();
        assert_eq!(frame.declared_len, 5);
        assert_eq!(frame.text(), "OK");
        assert!(frame.checksum_ok());
        assert!(!frame.length_ok);
    }

    #[test]
    fn test_good_frames_have_a_matching_length() {
        let frame = Reassembler::default()
            .reassemble(&capture_of(&scenario_bytes()))
            .unwrap();
        assert!(frame.length_ok);
    }

    /// Flips the last sample of every fourth bit: a vote still reads it right.
    fn smudge(capture: &str, spb: usize) -> String {
        capture
            .chars()
            .enumerate()
            .map(|(i, c)| match (i % (4 * spb) == spb - 1, c) {
                (true, '0') => '1',
                (true, '1') => '0',
                _ => c,
            })
            .collect()
    }

    #[test]
    fn test_find_frame_in_unaligned_capture() {
        let r = Reassembler::default();
        let frame = r.encode_payload(b"hello").unwrap();
        // Idle line, a partial bit, the frame, then noise.
        let capture = format!("{}{}{}{}", "0".repeat(40), "111", smudge(&frame, 8), "0110".repeat(30));
        assert!(r.reassemble(&capture).is_err());

        let found = r.find_frame(&capture, &FRAME_PREAMBLE).unwrap().unwrap();
        assert_eq!(found.preamble, FRAME_PREAMBLE);
        assert_eq!(found.text(), "hello");
        assert!(found.checksum_ok());
        assert!(found.length_ok);
        assert_eq!(found.bits, r.clean(&frame).unwrap());
    }

    #[test]
    fn test_find_frame_skips_other_preambles() {
        let r = Reassembler::default();
        let other = r.encode_capture(&[1, 2, 3, 4], b"no").unwrap();
        let ours = r.encode_payload(b"yes").unwrap();
        let capture = format!("{other}0000000{ours}");

        assert_eq!(r.find_frame(&other, &FRAME_PREAMBLE).unwrap(), None);
        let found = r.find_frame(&capture, &FRAME_PREAMBLE).unwrap().unwrap();
        assert_eq!(found.text(), "yes");
    }

    #[test]
    fn test_find_frame_needs_the_whole_frame() {
        let r = Reassembler::default();
        let frame = r.encode_payload(b"cut").unwrap();
        let cut = &frame[..frame.len() - 8 * 12];
        assert_eq!(r.find_frame(cut, &FRAME_PREAMBLE).unwrap(), None);
        assert_eq!(r.find_frame("", &FRAME_PREAMBLE).unwrap(), None);
        assert!(matches!(
            r.find_frame("01x", &FRAME_PREAMBLE),
            Err(DecodeError::InvalidSample { position: 2, found: 'x' })
        ));
    }
}
