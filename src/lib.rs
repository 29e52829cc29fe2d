//! # ask4lane
//!
//! A portable, no_std link layer for cheap multi-channel ASK remote-control
//! radios (433/315 MHz "4-button" transmitter/receiver pairs such as the
//! TX118SA-4 with a latching receiver), driven over four digital lines.
//!
//! Those radios can only tell a receiver that *a button was pressed*. They
//! latch every press for ~200 ms, stretch it by a few tens of milliseconds,
//! and occasionally lose one entirely, but they never invent one. This crate
//! turns the four buttons into a byte link by giving each lane a fixed role:
//!
//! | Lane    | Pulse means          |
//! |---------|----------------------|
//! | `start` | a frame begins       |
//! | `zero`  | next bit is `0`      |
//! | `one`   | next bit is `1`      |
//! | `end`   | the frame is over    |
//!
//! A lost pulse therefore costs a frame, never a wrong byte.
//!
//! It also ships the offline half of a single-lane capture format: a 4b6b
//! constant-weight symbol alphabet, an XOR-checksummed wire frame, and a
//! reassembler that recovers frames from 8x oversampled logic captures.
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Disables `#![no_std]`, uses `std::vec::Vec` for frames and enables [`reassemble`] |
//! | `sim`       | Deterministic simulated lanes and channel ([`sim`]), implies `std` |
//! | `defmt-0-3` | Uses `defmt` logging |
//! | `log`       | Uses `log` logging |
//! | `cli`       | Builds the `ask-reassemble` binary |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ask4lane::driver::{AskTransceiver, Lanes, TransceiverConfig};
//! use ask4lane::lane::PinLane;
//!
//! let lanes = Lanes {
//!     start: PinLane::new(d2, delay.clone()),
//!     zero: PinLane::new(d3, delay.clone()),
//!     one: PinLane::new(d4, delay.clone()),
//!     end: PinLane::new(d5, delay.clone()),
//! };
//! let mut link = AskTransceiver::new(lanes, delay, TransceiverConfig::default())?;
//! link.write_bytes(b"hello")?;
//! if let Some(frame) = link.read_frame(10_000)? {
//!     // ...
//! }
//! ```
//!
//! ## Modules
//!
//! - [`lane`]: the [`Lane`](lane::Lane) capability and its `embedded-hal` pin implementation
//! - [`driver`]: the blocking 4-lane transceiver
//! - [`encoding`]: the 16-entry 3-of-6 symbol alphabet
//! - [`frame`]: wire frame layout and checksum
//! - [`reassemble`]: offline capture decoder and encoder (`std`)
//! - [`sim`]: simulated link for tests and experiments (`sim`)
//!
//! ## Integration Notes
//!
//! Everything blocks, and slowly: a bit costs one pulse period (300 ms with
//! the defaults). Run the transceiver from a task or thread that can afford
//! to wait.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
pub use heapless;

#[macro_use]
mod fmt;

pub mod consts;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod lane;
#[cfg(feature = "std")]
pub mod reassemble;
#[cfg(feature = "sim")]
pub mod sim;
