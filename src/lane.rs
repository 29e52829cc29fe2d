//! Lane capability: one physical digital line of the 4-lane link.
//!
//! The transceiver only ever asks four things of a lane: drive it, release
//! it, look at it, and wait for it to pulse. [`Lane`] captures exactly that,
//! so the same state machine runs against real pins ([`PinLane`]) and against
//! the deterministic simulator in [`crate::sim`].
//!
//! ## Pulse timing
//!
//! [`Lane::await_pulse`] mirrors a classic "time a high pulse" primitive with
//! one twist: if the line is already high when the call starts, the rest of
//! that pulse is swallowed (bounded by a recovery window) and the call
//! reports [`PulseOutcome::AlreadyActive`]. Either way, when it returns
//! `Elapsed` or `AlreadyActive`, the caller sits just after a falling edge,
//! which is what keeps the link synchronized without a clock.

use crate::consts::DEFAULT_POLL_US;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// Identifies the role a lane plays in the link.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum LaneId {
    /// Pulsed once to open a frame.
    Start,
    /// Pulsed for every `0` bit.
    Zero,
    /// Pulsed for every `1` bit.
    One,
    /// Pulsed once to close a frame.
    End,
}

impl LaneId {
    /// All lanes, in wiring order.
    pub const ALL: [LaneId; 4] = [LaneId::Start, LaneId::Zero, LaneId::One, LaneId::End];

    /// The data lane that carries `bit` (`0` or `1`; other values use the one-lane).
    pub const fn for_bit(bit: u8) -> Self {
        if bit == 0 { LaneId::Zero } else { LaneId::One }
    }

    /// Position of this lane in [`LaneId::ALL`].
    pub const fn index(self) -> usize {
        match self {
            LaneId::Start => 0,
            LaneId::Zero => 1,
            LaneId::One => 2,
            LaneId::End => 3,
        }
    }
}

/// Result of waiting for a pulse on a lane.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum PulseOutcome {
    /// A pulse started and finished within the timeout; carries its length in µs.
    Elapsed(u32),
    /// No pulse started within the timeout.
    TimedOut,
    /// The lane was already high when the wait began (or was still high when
    /// the timeout ran out). The remainder of that pulse has been consumed,
    /// up to the recovery window.
    AlreadyActive,
}

impl PulseOutcome {
    /// `true` for every outcome except [`PulseOutcome::TimedOut`].
    pub fn observed(self) -> bool {
        !matches!(self, PulseOutcome::TimedOut)
    }
}

/// A single digital line the transceiver can drive and observe.
///
/// Implementations own their line exclusively for as long as the transceiver
/// holds them.
pub trait Lane {
    /// Hardware error reported by the underlying line.
    type Error: core::fmt::Debug;

    /// Drives the lane active. Idempotent.
    fn assert(&mut self) -> Result<(), Self::Error>;

    /// Releases the lane. Idempotent.
    fn deassert(&mut self) -> Result<(), Self::Error>;

    /// Samples the lane: `true` while a pulse is present.
    fn read(&mut self) -> Result<bool, Self::Error>;

    /// Blocks until a pulse has been observed or `timeout_us` has elapsed.
    ///
    /// # Arguments
    /// - `timeout_us`: how long to wait for a pulse to start (and, once
    ///   started, to finish)
    /// - `recovery_us`: how long to keep waiting for an in-progress pulse to
    ///   end before giving up on it
    fn await_pulse(&mut self, timeout_us: u32, recovery_us: u32)
    -> Result<PulseOutcome, Self::Error>;
}

/// A [`Lane`] backed by an `embedded-hal` pin.
///
/// The pin must support both directions (e.g. a flex/open-drain pin or a
/// type-erased GPIO), since a lane can transmit or receive. Pulse timing is
/// done by polling the pin every `poll_us` microseconds with the supplied
/// delay, so measured durations are accurate to one poll interval.
///
/// ## Example
///
/// ```rust
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// # use embedded_hal_mock::eh1::delay::NoopDelay;
/// use ask4lane::lane::{Lane, PinLane, PulseOutcome};
///
/// let pin = Pin::new(&[
///     PinTransaction::get(PinState::Low),
///     PinTransaction::get(PinState::Low),
///     PinTransaction::get(PinState::High),
///     PinTransaction::get(PinState::High),
///     PinTransaction::get(PinState::Low),
/// ]);
/// let mut lane = PinLane::new(pin, NoopDelay::new());
/// assert_eq!(lane.await_pulse(1_000, 1_000).unwrap(), PulseOutcome::Elapsed(100));
/// # lane.release().0.done();
/// ```
#[derive(Debug)]
pub struct PinLane<P, D> {
    pin: P,
    delay: D,
    poll_us: u32,
    inverted: bool,
}

impl<P, D> PinLane<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    /// Wraps `pin`, polling every [`DEFAULT_POLL_US`] µs. Active-high.
    pub fn new(pin: P, delay: D) -> Self {
        Self {
            pin,
            delay,
            poll_us: DEFAULT_POLL_US,
            inverted: false,
        }
    }

    /// Sets the polling interval used while timing pulses (minimum 1 µs).
    pub fn with_poll_us(mut self, poll_us: u32) -> Self {
        self.poll_us = poll_us.max(1);
        self
    }

    /// Treats the pin as active-low (a pulse is `LOW`).
    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Gives back the pin and delay.
    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    /// Polls until the lane reads `active`, or `timeout_us` passes.
    ///
    /// Returns the time waited, or `None` on timeout.
    fn wait_for(
        &mut self,
        active: bool,
        timeout_us: u32,
    ) -> Result<Option<u32>, <P as ErrorType>::Error> {
        let mut waited: u32 = 0;
        loop {
            if self.read()? == active {
                return Ok(Some(waited));
            }
            if waited >= timeout_us {
                return Ok(None);
            }
            self.delay.delay_us(self.poll_us);
            waited = waited.saturating_add(self.poll_us);
        }
    }
}

impl<P, D> Lane for PinLane<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    type Error = <P as ErrorType>::Error;

    fn assert(&mut self) -> Result<(), Self::Error> {
        if self.inverted {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        }
    }

    fn deassert(&mut self) -> Result<(), Self::Error> {
        if self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }

    fn read(&mut self) -> Result<bool, Self::Error> {
        let high = self.pin.is_high()?;
        Ok(high != self.inverted)
    }

    fn await_pulse(
        &mut self,
        timeout_us: u32,
        recovery_us: u32,
    ) -> Result<PulseOutcome, Self::Error> {
        if self.read()? {
            let _ = self.wait_for(false, recovery_us)?;
            return Ok(PulseOutcome::AlreadyActive);
        }
        if self.wait_for(true, timeout_us)?.is_none() {
            return Ok(PulseOutcome::TimedOut);
        }
        match self.wait_for(false, timeout_us)? {
            Some(width) => Ok(PulseOutcome::Elapsed(width)),
            None => {
                let _ = self.wait_for(false, recovery_us)?;
                Ok(PulseOutcome::AlreadyActive)
            }
        }
    }
}
