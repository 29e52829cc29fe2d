//! 4-lane ASK transceiver for latching remote-control radio modules.
//!
//! This module provides the [`AskTransceiver`] struct, which moves bytes over
//! four independent digital lines wired to a multi-channel ASK remote
//! transmitter/receiver pair (e.g. an EV1527-coded TX118SA-4 and its
//! matching receiver in latching mode).
//!
//! These radios are slow (a received pulse lasts ~200 ms) and jittery (pulse
//! widths stretch by 20–40 ms), but they never invent or corrupt a pulse:
//! they only ever *drop* one. The protocol therefore encodes information in
//! *which* lane pulses, never in how long:
//!
//! | Lane    | Meaning                   |
//! |---------|---------------------------|
//! | `start` | a frame begins            |
//! | `zero`  | the next bit is `0`       |
//! | `one`   | the next bit is `1`       |
//! | `end`   | the frame is complete     |
//!
//! Bytes are sent least-significant bit first. There is no length field and
//! no clock: every wait resumes right after the falling edge of the previous
//! pulse, so the receiver re-synchronizes on every pulse, however long the
//! frame.
//!
//! ## Example
//!
//! ```rust
//! use ask4lane::driver::{AskTransceiver, TransceiverConfig};
//! use ask4lane::sim::{ChannelConfig, SimChannel};
//!
//! // Transmit on one simulated channel...
//! let tx_channel = SimChannel::new(ChannelConfig::ideal(7));
//! let mut tx = AskTransceiver::new(tx_channel.lanes(), tx_channel.delay(), TransceiverConfig::default())?;
//! tx.write_bytes(b"hi")?;
//!
//! // ...and replay what the receiver would have seen on another.
//! let rx_channel = SimChannel::replay(ChannelConfig::ideal(7), tx_channel.take_pulses());
//! let mut rx = AskTransceiver::new(rx_channel.lanes(), rx_channel.delay(), TransceiverConfig::default())?;
//! assert_eq!(rx.read_frame(1_000)?.as_deref(), Some(&b"hi"[..]));
//! # Ok::<(), ask4lane::error::Error<core::convert::Infallible>>(())
//! ```
//!
//! ## Design Notes
//!
//! Everything here blocks: a bit costs `write_ms + recovery_ms` (300 ms with
//! the defaults), so a byte is on the air for about 2.4 s. Only the wait for
//! a frame to start is generously bounded; inside a frame every wait uses the
//! short [`HYSTERESIS_MS`] window and any miss abandons the whole frame.

use core::ops::ControlFlow;

use crate::consts::{
    BITS_PER_BYTE, DEFAULT_RECOVERY_MS, DEFAULT_WRITE_MS, HYSTERESIS_MS, MAX_FRAME_LEN,
};
use crate::error::{ConfigError, Error};
use crate::lane::{Lane, LaneId};
use embedded_hal::delay::DelayNs;

#[cfg(not(feature = "std"))]
use heapless::Vec;

/// Payload bytes of one received frame.
#[cfg(feature = "std")]
pub type Frame = Vec<u8>;

/// Payload bytes of one received frame.
///
/// Bounded by [`MAX_FRAME_LEN`]; a longer frame is reported as truncated.
#[cfg(not(feature = "std"))]
pub type Frame = Vec<u8, MAX_FRAME_LEN>;

/// Largest [`TransceiverConfig::max_frame_len`] a [`Frame`] can hold.
#[cfg(feature = "std")]
pub const FRAME_CAPACITY: usize = usize::MAX;

/// Largest [`TransceiverConfig::max_frame_len`] a [`Frame`] can hold.
#[cfg(not(feature = "std"))]
pub const FRAME_CAPACITY: usize = MAX_FRAME_LEN;

/// Longest wait (ms) one [`Lane::await_pulse`] call can express in µs.
const MAX_WAIT_MS: u32 = u32::MAX / 1_000;

/// High-level state of the [`AskTransceiver`].
///
/// The lanes are shared between both directions, so the transceiver is only
/// ever doing one thing at a time.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum TransceiverMode {
    /// Not driving or reading the lanes. All lanes are released.
    #[default]
    Idle,
    /// A frame is being transmitted.
    Tx,
    /// Waiting for, or reading, a frame.
    Rx,
}

/// Timing configuration for an [`AskTransceiver`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TransceiverConfig {
    /// How long each lane is held asserted on transmit (ms).
    pub write_ms: u32,
    /// Idle time after each transmitted pulse (ms). Also bounds how long the
    /// receiver waits for a pulse it is inside of to end.
    pub recovery_ms: u32,
    /// Window (ms) used inside a frame to decide between "next bit" and
    /// "end of frame".
    pub hysteresis_ms: u32,
    /// Payload bytes accepted per received frame. A frame that runs past
    /// this is reported as truncated.
    pub max_frame_len: usize,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            write_ms: DEFAULT_WRITE_MS,
            recovery_ms: DEFAULT_RECOVERY_MS,
            hysteresis_ms: HYSTERESIS_MS,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl TransceiverConfig {
    /// Checks that the timings describe a usable link.
    ///
    /// # Errors
    /// A [`ConfigError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_ms == 0 {
            return Err(ConfigError::ZeroWriteTime);
        }
        if self.recovery_ms == 0 {
            return Err(ConfigError::ZeroRecoveryTime);
        }
        if self.hysteresis_ms == 0 {
            return Err(ConfigError::ZeroHysteresis);
        }
        let period_ms = self.write_ms.saturating_add(self.recovery_ms);
        if self.hysteresis_ms >= period_ms {
            return Err(ConfigError::HysteresisTooLong {
                hysteresis_ms: self.hysteresis_ms,
                period_ms,
            });
        }
        if self.max_frame_len == 0 || self.max_frame_len > FRAME_CAPACITY {
            return Err(ConfigError::FrameLenOutOfRange {
                max_frame_len: self.max_frame_len,
                capacity: FRAME_CAPACITY,
            });
        }
        Ok(())
    }

    fn recovery_us(&self) -> u32 {
        ms_to_us(self.recovery_ms)
    }

    fn hysteresis_us(&self) -> u32 {
        ms_to_us(self.hysteresis_ms)
    }
}

fn ms_to_us(ms: u32) -> u32 {
    ms.saturating_mul(1_000)
}

/// The four lanes of a link, by role.
#[derive(Debug)]
pub struct Lanes<L> {
    /// Opens a frame.
    pub start: L,
    /// Carries `0` bits.
    pub zero: L,
    /// Carries `1` bits.
    pub one: L,
    /// Closes a frame.
    pub end: L,
}

/// How a receive attempt ended.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum RxOutcome {
    /// A complete frame, closed by an end pulse. May be empty.
    Frame(Frame),
    /// No start pulse arrived before the timeout. Routine on an idle channel.
    NoFrame,
    /// A frame started but a data pulse went missing before the end pulse.
    /// The partial bytes are discarded.
    Truncated,
}

/// Running counters for an [`AskTransceiver`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct LinkStats {
    /// Frames transmitted in full.
    pub tx_good: u16,
    /// Frames received in full.
    pub rx_good: u16,
    /// Frames abandoned after their start pulse.
    pub rx_truncated: u16,
    /// Receive attempts that saw no start pulse.
    pub rx_idle: u16,
}

/// A blocking transmitter/receiver over four [`Lane`]s.
///
/// ## Type Parameters
///
/// - `L`: the lane type. All four lanes share it; on real hardware use a
///   type-erased pin wrapped in [`PinLane`](crate::lane::PinLane).
/// - `D`: a delay provider used for pulse hold, recovery and hysteresis times.
///
/// ## Notes
///
/// - Transmit and receive share the lanes, so both take `&mut self`.
/// - Timing outcomes (no frame, truncated frame) are returned as values.
///   Only lane I/O errors come back as [`Error`].
#[derive(Debug)]
pub struct AskTransceiver<L, D>
where
    L: Lane,
    D: DelayNs,
{
    /// What the transceiver is currently doing.
    pub mode: TransceiverMode,
    /// Counters since construction.
    pub stats: LinkStats,
    start: L,
    data: [L; 2],
    end: L,
    delay: D,
    config: TransceiverConfig,
}

impl<L, D> AskTransceiver<L, D>
where
    L: Lane,
    D: DelayNs,
{
    /// Creates a transceiver owning `lanes`.
    ///
    /// # Arguments
    /// - `lanes`: the start, zero, one and end lanes.
    /// - `delay`: the delay provider for all fixed waits.
    /// - `config`: link timings, see [`TransceiverConfig::default`].
    ///
    /// # Errors
    /// - [`Error::Config`] if `config` fails [`TransceiverConfig::validate`]
    /// - [`Error::Lane`] if a lane cannot be released
    ///
    /// # Notes
    /// All lanes are released on construction.
    pub fn new(lanes: Lanes<L>, delay: D, config: TransceiverConfig) -> Result<Self, Error<L::Error>> {
        config.validate()?;
        let Lanes {
            start,
            zero,
            one,
            end,
        } = lanes;
        let mut cls = Self {
            mode: TransceiverMode::Idle,
            stats: LinkStats::default(),
            start,
            data: [zero, one],
            end,
            delay,
            config,
        };
        for id in LaneId::ALL {
            cls.lane_mut(id).deassert().map_err(Error::Lane)?;
        }
        Ok(cls)
    }

    /// The timings in use.
    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    /// Gives back the lanes and delay.
    pub fn release(self) -> (Lanes<L>, D) {
        let [zero, one] = self.data;
        (
            Lanes {
                start: self.start,
                zero,
                one,
                end: self.end,
            },
            self.delay,
        )
    }

    fn lane_mut(&mut self, id: LaneId) -> &mut L {
        match id {
            LaneId::Start => &mut self.start,
            LaneId::Zero => &mut self.data[0],
            LaneId::One => &mut self.data[1],
            LaneId::End => &mut self.end,
        }
    }

    /// Asserts `id` for `write_ms`, releases it, then idles for `recovery_ms`.
    fn pulse(&mut self, id: LaneId) -> Result<(), Error<L::Error>> {
        self.lane_mut(id).assert().map_err(Error::Lane)?;
        self.delay.delay_ms(self.config.write_ms);
        self.lane_mut(id).deassert().map_err(Error::Lane)?;
        self.delay.delay_ms(self.config.recovery_ms);
        Ok(())
    }

    /// Transmits `bytes` as one frame.
    ///
    /// Pulses the start lane, then one data lane per bit (each byte least
    /// significant bit first), then the end lane. Blocks until the end pulse
    /// has been sent and its recovery time has passed.
    ///
    /// # Errors
    /// [`Error::Lane`] if a lane fails. The lanes are left released.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<L::Error>> {
        self.mode = TransceiverMode::Tx;
        debug!("tx: frame of {} bytes", bytes.len());
        let result = self.write_frame(bytes);
        if result.is_err() {
            for id in LaneId::ALL {
                let _ = self.lane_mut(id).deassert();
            }
        }
        self.mode = TransceiverMode::Idle;
        result?;
        self.stats.tx_good = self.stats.tx_good.wrapping_add(1);
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), Error<L::Error>> {
        self.pulse(LaneId::Start)?;
        for &byte in bytes {
            trace!("tx: byte {}", byte);
            for i in 0..BITS_PER_BYTE {
                self.pulse(LaneId::for_bit((byte >> i) & 1))?;
            }
        }
        self.pulse(LaneId::End)
    }

    /// Waits for a pulse on `id` and, if one shows up, for it to end.
    ///
    /// Returns `false` if nothing arrived within `timeout_us`. On `true`,
    /// control is just past the falling edge of the pulse.
    fn sync_lane(&mut self, id: LaneId, timeout_us: u32) -> Result<bool, Error<L::Error>> {
        let recovery_us = self.config.recovery_us();
        let outcome = self
            .lane_mut(id)
            .await_pulse(timeout_us, recovery_us)
            .map_err(Error::Lane)?;
        Ok(outcome.observed())
    }

    /// Reads one bit from whichever data lane is currently high.
    ///
    /// Control is expected to be just inside a data pulse: the previous
    /// hysteresis wait has eaten the ~90 ms gap and then some. Returns `None`
    /// if neither lane is high, i.e. the pulse was lost.
    fn read_bit(&mut self) -> Result<Option<u8>, Error<L::Error>> {
        let recovery_us = self.config.recovery_us();
        for (bit, lane) in (0u8..).zip(self.data.iter_mut()) {
            if lane.read().map_err(Error::Lane)? {
                let _ = lane
                    .await_pulse(recovery_us, recovery_us)
                    .map_err(Error::Lane)?;
                return Ok(Some(bit));
            }
        }
        Ok(None)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Error<L::Error>> {
        let mut byte = 0;
        for i in 0..BITS_PER_BYTE {
            let Some(bit) = self.read_bit()? else {
                debug!("rx: no data pulse at bit {}", i);
                return Ok(None);
            };
            byte |= bit << i;
            self.delay.delay_ms(self.config.hysteresis_ms);
        }
        Ok(Some(byte))
    }

    /// Reads bytes until the end lane pulses. `None` if a byte was lost.
    fn read_bytes(&mut self) -> Result<Option<Frame>, Error<L::Error>> {
        let hysteresis_us = self.config.hysteresis_us();
        let mut frame = Frame::new();
        // Waiting out the hysteresis window on the end lane also eats the
        // inter-pulse gap, leaving control inside the next data pulse.
        while !self.sync_lane(LaneId::End, hysteresis_us)? {
            let Some(byte) = self.read_byte()? else {
                return Ok(None);
            };
            trace!("rx: byte {}", byte);
            if frame.len() >= self.config.max_frame_len || !push_byte(&mut frame, byte) {
                warn!("rx: frame exceeds {} bytes", self.config.max_frame_len);
                return Ok(None);
            }
        }
        Ok(Some(frame))
    }

    /// Waits up to `start_timeout_ms` for a frame and reads it.
    ///
    /// # Returns
    /// - [`RxOutcome::Frame`] with the payload (possibly empty)
    /// - [`RxOutcome::NoFrame`] if no start pulse arrived in time
    /// - [`RxOutcome::Truncated`] if the frame started but a pulse was lost,
    ///   or it ran past [`TransceiverConfig::max_frame_len`]
    ///
    /// The whole `u32` range of `start_timeout_ms` is honoured; waits longer
    /// than a lane can time in one call are split up.
    ///
    /// # Errors
    /// [`Error::Lane`] if a lane fails.
    pub fn receive_frame(&mut self, start_timeout_ms: u32) -> Result<RxOutcome, Error<L::Error>> {
        self.mode = TransceiverMode::Rx;
        let result = self.receive_inner(start_timeout_ms);
        self.mode = TransceiverMode::Idle;
        let outcome = result?;
        match &outcome {
            RxOutcome::Frame(frame) => {
                debug!("rx: frame of {} bytes", frame.len());
                self.stats.rx_good = self.stats.rx_good.wrapping_add(1);
            }
            RxOutcome::NoFrame => {
                trace!("rx: no start pulse within {} ms", start_timeout_ms);
                self.stats.rx_idle = self.stats.rx_idle.wrapping_add(1);
            }
            RxOutcome::Truncated => {
                info!("rx: frame truncated, discarding");
                self.stats.rx_truncated = self.stats.rx_truncated.wrapping_add(1);
            }
        }
        Ok(outcome)
    }

    /// Waits for the start pulse, in slices short enough to count in µs.
    fn await_start(&mut self, timeout_ms: u32) -> Result<bool, Error<L::Error>> {
        let mut remaining = timeout_ms;
        loop {
            let slice = remaining.min(MAX_WAIT_MS);
            if self.sync_lane(LaneId::Start, ms_to_us(slice))? {
                return Ok(true);
            }
            remaining -= slice;
            if remaining == 0 {
                return Ok(false);
            }
        }
    }

    fn receive_inner(&mut self, start_timeout_ms: u32) -> Result<RxOutcome, Error<L::Error>> {
        if !self.await_start(start_timeout_ms)? {
            return Ok(RxOutcome::NoFrame);
        }
        Ok(match self.read_bytes()? {
            Some(frame) => RxOutcome::Frame(frame),
            None => RxOutcome::Truncated,
        })
    }

    /// Waits up to `start_timeout_ms` for a frame and reads it.
    ///
    /// # Returns
    /// - `Some(bytes)`: a complete frame; `Some` of an empty frame is a frame
    ///   that carried no bytes
    /// - `None`: no frame started in time, or the frame lost a pulse
    ///
    /// Use [`receive_frame`](Self::receive_frame) to tell the two `None` cases apart.
    ///
    /// # Errors
    /// [`Error::Lane`] if a lane fails.
    pub fn read_frame(&mut self, start_timeout_ms: u32) -> Result<Option<Frame>, Error<L::Error>> {
        Ok(match self.receive_frame(start_timeout_ms)? {
            RxOutcome::Frame(frame) => Some(frame),
            RxOutcome::NoFrame | RxOutcome::Truncated => None,
        })
    }

    /// Receives frames in a loop, handing each one to `on_frame`.
    ///
    /// Idle timeouts and truncated frames are skipped silently; the remote is
    /// expected to repeat itself. Returns once `on_frame` breaks.
    ///
    /// # Arguments
    /// - `start_timeout_ms`: the wait used for each receive attempt.
    /// - `on_frame`: called with every complete frame.
    ///
    /// # Errors
    /// [`Error::Lane`] if a lane fails.
    pub fn listen<F>(&mut self, start_timeout_ms: u32, mut on_frame: F) -> Result<(), Error<L::Error>>
    where
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        loop {
            if let Some(frame) = self.read_frame(start_timeout_ms)? {
                if on_frame(&frame).is_break() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(feature = "std")]
fn push_byte(frame: &mut Frame, byte: u8) -> bool {
    frame.push(byte);
    true
}

#[cfg(not(feature = "std"))]
fn push_byte(frame: &mut Frame, byte: u8) -> bool {
    frame.push(byte).is_ok()
}
