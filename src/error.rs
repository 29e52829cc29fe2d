//! Error types.
//!
//! Timing outcomes on the lossy link (no start pulse, a missing data pulse)
//! are ordinary values and never show up here. Errors are reserved for
//! hard failures: bad configuration, pin I/O, and malformed captures.

use core::fmt::Debug;
use thiserror::Error;

/// Rejected [`TransceiverConfig`](crate::driver::TransceiverConfig) values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A pulse must be held for a non-zero time.
    #[error("write_ms must be greater than zero")]
    ZeroWriteTime,

    /// The idle time after each pulse must be non-zero.
    #[error("recovery_ms must be greater than zero")]
    ZeroRecoveryTime,

    /// The inter-pulse hysteresis window must be non-zero.
    #[error("hysteresis_ms must be greater than zero")]
    ZeroHysteresis,

    /// The hysteresis window would skip over a whole pulse period.
    #[error("hysteresis_ms ({hysteresis_ms}) must be shorter than one pulse period ({period_ms} ms)")]
    HysteresisTooLong {
        /// Configured hysteresis window.
        hysteresis_ms: u32,
        /// `write_ms + recovery_ms`
        period_ms: u32,
    },

    /// The frame bound is zero or larger than a frame buffer can hold.
    #[error("max_frame_len ({max_frame_len}) must be between 1 and {capacity}")]
    FrameLenOutOfRange {
        /// Configured bound.
        max_frame_len: usize,
        /// Largest bound the frame buffer supports.
        capacity: usize,
    },
}

/// Hard failures raised by the transceiver.
#[derive(Debug, Error)]
pub enum Error<E: Debug> {
    /// A lane reported an I/O error.
    #[error("lane I/O error: {0:?}")]
    Lane(E),

    /// The transceiver was built with an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Wire frame layout errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the header and declared payload require.
    #[error("frame too short: need at least {required} bytes, got {actual}")]
    TooShort {
        /// Bytes needed.
        required: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The payload does not fit the 16-bit length field.
    #[error("payload of {len} bytes exceeds the 16-bit length field")]
    PayloadTooLong {
        /// Payload length.
        len: usize,
    },

    /// The output buffer cannot hold the encoded frame.
    #[error("output buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
        /// Bytes available.
        actual: usize,
    },
}

/// Capture decoding errors raised by the reassembler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The capture holds something other than `'0'`, `'1'` or whitespace.
    #[error("invalid sample {found:?} at position {position}")]
    InvalidSample {
        /// Character offset in the capture.
        position: usize,
        /// The offending character.
        found: char,
    },

    /// A 6-bit window has no entry in the symbol table.
    #[error("unmapped symbol {window:#08b} at symbol index {index}")]
    UnmappedSymbol {
        /// Index of the window in the cleaned bitstream.
        index: usize,
        /// The raw (LSB-first) window.
        window: u8,
    },

    /// The cleaned bitstream does not end on a symbol boundary.
    #[error("{count} trailing bits do not fill a symbol")]
    TrailingBits {
        /// Bits left over.
        count: usize,
    },

    /// The decoded nibbles cannot be paired into bytes.
    #[error("odd number of nibbles ({count})")]
    OddNibbleCount {
        /// Number of nibbles decoded.
        count: usize,
    },

    /// The decoded bytes do not form a wire frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}
