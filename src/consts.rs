//! Constants used across the 4-lane ASK protocol implementation.
//!
//! This module defines protocol-wide timing defaults, frame layout sizes and
//! oversampling parameters shared by the live transceiver and the offline
//! reassembler.
//!
//! ## Key Concepts
//!
//! - **Timing**: The remote-control transmitters this targets latch each keyed
//!   pulse for roughly 200 ms at the receiver, followed by a ~90 ms gap. Every
//!   in-frame wait is derived from those two figures.
//! - **Wire frame**: `preamble(4) | length(2, LE) | payload | checksum(1)`,
//!   used by captures handled in [`crate::reassemble`].
//! - **Oversampling**: Captures record every logical bit [`SAMPLES_PER_BIT`] times.

/// Default time (ms) a lane is held asserted when transmitting a pulse.
pub const DEFAULT_WRITE_MS: u32 = 50;

/// Default idle time (ms) after a lane is released, before the next pulse.
///
/// Also bounds how long a receiver waits for an in-progress pulse to end.
pub const DEFAULT_RECOVERY_MS: u32 = 250;

/// Window (ms) used between data pulses to tell "next bit" from "end of frame".
///
/// Derived from the ~90 ms measured inter-pulse gap plus margin.
pub const HYSTERESIS_MS: u32 = 110;

/// Default time (ms) to wait for a frame to start.
pub const DEFAULT_START_TIMEOUT_MS: u32 = 10_000;

/// Default pin polling resolution (µs) used when timing pulses on real pins.
pub const DEFAULT_POLL_US: u32 = 100;

/// Number of lanes the protocol drives: start, zero, one and end.
pub const LANE_COUNT: usize = 4;

/// Bits carried per payload byte on the live link.
pub const BITS_PER_BYTE: u8 = 8;

/// Maximum number of payload bytes buffered for a live frame without `std`.
///
/// The live protocol carries no length field, so a frame is bounded only by
/// this capacity (and the caller's patience: a byte takes ~2.4 s on air).
pub const MAX_FRAME_LEN: usize = 64;

/// Number of raw samples recorded per logical bit in a capture.
pub const SAMPLES_PER_BIT: usize = 8;

/// Width in bits of a constant-weight symbol.
pub const SYMBOL_BITS: usize = 6;

/// Number of set bits in every valid symbol.
pub const SYMBOL_WEIGHT: u32 = 3;

/// Length (in bytes) of the wire frame preamble.
pub const PREAMBLE_LEN: usize = 4;

/// Length (in bytes) of the little-endian payload length field.
pub const LENGTH_LEN: usize = 2;

/// Length (in bytes) of the trailing checksum.
pub const CHECKSUM_LEN: usize = 1;

/// Bytes a wire frame adds around its payload.
pub const FRAME_OVERHEAD: usize = PREAMBLE_LEN + LENGTH_LEN + CHECKSUM_LEN;

/// Preamble used when encoding a capture without an explicit one.
///
/// The little-endian bytes of `0xd31f26e7`.
pub const FRAME_PREAMBLE: [u8; PREAMBLE_LEN] = 0xd31f_26e7_u32.to_le_bytes();
