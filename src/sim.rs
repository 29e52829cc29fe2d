//! Deterministic simulation of a 4-lane latching radio link.
//!
//! Real receivers do not reproduce what the transmitter keyed. Every pulse
//! comes out latched for roughly 200 ms no matter how briefly the button
//! was held, its width wanders by a few tens of milliseconds either way, and
//! now and then a pulse does not arrive at all.
//!
//! With the default transceiver timings a received pulse must last at least
//! ~190 ms: the receiver looks for the next pulse 110 ms after a falling
//! edge, and the next pulse starts 300 ms after the previous rising edge.
//! Narrower pulses truncate the frame. [`SimChannel`] models exactly that,
//! on a virtual clock, so the transceiver can be exercised without hardware
//! and without sleeping.
//!
//! A channel records what its lanes transmit, as the far receiver would see
//! it. Because the transceiver blocks, transmit and receive run one after the
//! other: record on one channel, then [`SimChannel::replay`] the recorded
//! pulses on a fresh one and receive from that.
//!
//! All randomness comes from a seeded [`ChaCha8Rng`], so a seed always
//! reproduces the same run.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::consts::LANE_COUNT;
use crate::driver::Lanes;
use crate::lane::{Lane, LaneId, PulseOutcome};

/// Channel impairments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    /// Width the receiver latches a keyed pulse to (ms). Keying longer than
    /// this is passed through.
    pub latch_ms: u32,
    /// Each received pulse is lengthened or shortened by an amount drawn
    /// uniformly from `-jitter_ms..=jitter_ms`.
    pub jitter_ms: u32,
    /// Probability in `[0, 1]` that a pulse is lost.
    pub drop_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl ChannelConfig {
    /// A channel that latches pulses to 200 ms and nothing else.
    pub fn ideal(seed: u64) -> Self {
        Self {
            latch_ms: 200,
            jitter_ms: 0,
            drop_rate: 0.0,
            seed,
        }
    }

    /// Pulses of 220 ± 20 ms with a 1% pulse loss.
    pub fn noisy(seed: u64) -> Self {
        Self {
            latch_ms: 220,
            jitter_ms: 20,
            drop_rate: 0.01,
            seed,
        }
    }

    /// Replaces the drop rate (clamped to `[0, 1]`).
    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.drop_rate = drop_rate.clamp(0.0, 1.0);
        self
    }
}

/// A pulse as seen by the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedPulse {
    /// Lane the pulse appears on.
    pub lane: LaneId,
    /// Rising edge, on the channel clock (µs).
    pub start_us: u64,
    /// Time the lane stays high (µs).
    pub duration_us: u64,
}

impl ScriptedPulse {
    /// Falling edge (µs).
    pub fn end_us(&self) -> u64 {
        self.start_us + self.duration_us
    }

    /// Same pulse, shifted later by `offset_us`.
    pub fn delayed_by(self, offset_us: u64) -> Self {
        Self {
            start_us: self.start_us + offset_us,
            ..self
        }
    }

    fn covers(&self, t: u64) -> bool {
        self.start_us <= t && t < self.end_us()
    }
}

#[derive(Debug)]
struct SimState {
    now_us: u64,
    cfg: ChannelConfig,
    rng: ChaCha8Rng,
    pulses: Vec<ScriptedPulse>,
    held: [Option<u64>; LANE_COUNT],
    dropped: usize,
}

impl SimState {
    fn advance(&mut self, us: u64) {
        self.now_us = self.now_us.saturating_add(us);
    }

    /// Latest falling edge of the pulses on `lane` that cover `t`, following
    /// overlapping pulses.
    fn active_until(&self, lane: LaneId, t: u64) -> Option<u64> {
        let mut end = self
            .pulses
            .iter()
            .filter(|p| p.lane == lane && p.covers(t))
            .map(ScriptedPulse::end_us)
            .max()?;
        while let Some(later) = self
            .pulses
            .iter()
            .filter(|p| p.lane == lane && p.covers(end))
            .map(ScriptedPulse::end_us)
            .max()
        {
            end = later;
        }
        Some(end)
    }

    fn next_rise(&self, lane: LaneId, after: u64) -> Option<u64> {
        self.pulses
            .iter()
            .filter(|p| p.lane == lane && p.start_us > after)
            .map(|p| p.start_us)
            .min()
    }

    /// Waits at most `limit_us` for `lane` to go low at `end_us`.
    fn wait_low(&mut self, end_us: u64, limit_us: u64) {
        let remaining = end_us.saturating_sub(self.now_us);
        self.advance(remaining.min(limit_us));
    }

    fn await_pulse(&mut self, lane: LaneId, timeout_us: u32, recovery_us: u32) -> PulseOutcome {
        let (timeout_us, recovery_us) = (u64::from(timeout_us), u64::from(recovery_us));

        if let Some(end) = self.active_until(lane, self.now_us) {
            self.wait_low(end, recovery_us);
            return PulseOutcome::AlreadyActive;
        }

        let rise = match self.next_rise(lane, self.now_us) {
            Some(rise) if rise - self.now_us <= timeout_us => rise,
            _ => {
                self.advance(timeout_us);
                return PulseOutcome::TimedOut;
            }
        };
        self.now_us = rise;
        let end = self.active_until(lane, rise).unwrap_or(rise);
        let width = end - rise;
        if width <= timeout_us {
            self.now_us = end;
            PulseOutcome::Elapsed(u32::try_from(width).unwrap_or(u32::MAX))
        } else {
            self.advance(timeout_us);
            self.wait_low(end, recovery_us);
            PulseOutcome::AlreadyActive
        }
    }

    /// Turns a keyed interval into what the receiver reports, or loses it.
    fn emit(&mut self, lane: LaneId, start_us: u64) {
        if self.cfg.drop_rate > 0.0 && self.rng.gen_bool(self.cfg.drop_rate) {
            self.dropped += 1;
            return;
        }
        let keyed = self.now_us - start_us;
        let latched = keyed.max(ms_to_us(self.cfg.latch_ms));
        let spread = i64::from(self.cfg.jitter_ms);
        let jitter_ms = self.rng.gen_range(-spread..=spread);
        let duration_us = latched.saturating_add_signed(jitter_ms * 1_000).max(1);
        self.pulses.push(ScriptedPulse {
            lane,
            start_us,
            duration_us,
        });
    }
}

fn ms_to_us(ms: u32) -> u64 {
    u64::from(ms) * 1_000
}

/// A simulated four-lane radio channel with a shared virtual clock.
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct SimChannel {
    state: Rc<RefCell<SimState>>,
}

impl SimChannel {
    /// Creates an empty channel at time zero.
    pub fn new(cfg: ChannelConfig) -> Self {
        Self::replay(cfg, Vec::new())
    }

    /// Creates a channel whose receivers will see `pulses`.
    pub fn replay(cfg: ChannelConfig, pulses: Vec<ScriptedPulse>) -> Self {
        let cfg = cfg.with_drop_rate(cfg.drop_rate);
        Self {
            state: Rc::new(RefCell::new(SimState {
                now_us: 0,
                cfg,
                rng: ChaCha8Rng::seed_from_u64(cfg.seed),
                pulses,
                held: [None; LANE_COUNT],
                dropped: 0,
            })),
        }
    }

    /// One [`SimLane`] per role, all bound to this channel.
    pub fn lanes(&self) -> Lanes<SimLane> {
        let lane = |id| SimLane {
            id,
            state: Rc::clone(&self.state),
        };
        Lanes {
            start: lane(LaneId::Start),
            zero: lane(LaneId::Zero),
            one: lane(LaneId::One),
            end: lane(LaneId::End),
        }
    }

    /// A delay that advances this channel's clock.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            state: Rc::clone(&self.state),
        }
    }

    /// Current channel time (µs).
    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }

    /// Pulses on the channel so far, as the receiver sees them.
    pub fn pulses(&self) -> Vec<ScriptedPulse> {
        self.state.borrow().pulses.clone()
    }

    /// Removes and returns the recorded pulses.
    pub fn take_pulses(&self) -> Vec<ScriptedPulse> {
        std::mem::take(&mut self.state.borrow_mut().pulses)
    }

    /// Number of pulses the channel has lost.
    pub fn dropped(&self) -> usize {
        self.state.borrow().dropped
    }
}

/// One lane of a [`SimChannel`].
#[derive(Debug)]
pub struct SimLane {
    id: LaneId,
    state: Rc<RefCell<SimState>>,
}

impl SimLane {
    /// The role this lane was created for.
    pub fn id(&self) -> LaneId {
        self.id
    }
}

impl Lane for SimLane {
    type Error = Infallible;

    fn assert(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let now = state.now_us;
        let _ = state.held[self.id.index()].get_or_insert(now);
        Ok(())
    }

    fn deassert(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if let Some(start) = state.held[self.id.index()].take() {
            state.emit(self.id, start);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<bool, Self::Error> {
        let state = self.state.borrow();
        Ok(state
            .pulses
            .iter()
            .any(|p| p.lane == self.id && p.covers(state.now_us)))
    }

    fn await_pulse(
        &mut self,
        timeout_us: u32,
        recovery_us: u32,
    ) -> Result<PulseOutcome, Self::Error> {
        Ok(self
            .state
            .borrow_mut()
            .await_pulse(self.id, timeout_us, recovery_us))
    }
}

/// A [`DelayNs`] that advances a [`SimChannel`] clock instead of sleeping.
#[derive(Debug, Clone)]
pub struct SimDelay {
    state: Rc<RefCell<SimState>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().advance(u64::from(ns.div_ceil(1_000)));
    }

    fn delay_us(&mut self, us: u32) {
        self.state.borrow_mut().advance(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().advance(ms_to_us(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(lane: LaneId, start_ms: u64, width_ms: u64) -> ScriptedPulse {
        ScriptedPulse {
            lane,
            start_us: start_ms * 1_000,
            duration_us: width_ms * 1_000,
        }
    }

    #[test]
    fn test_keyed_pulse_is_latched() {
        let channel = SimChannel::new(ChannelConfig::ideal(0));
        let mut lanes = channel.lanes();
        let mut delay = channel.delay();
        lanes.one.assert().unwrap();
        delay.delay_ms(50);
        lanes.one.deassert().unwrap();
        assert_eq!(channel.pulses(), vec![pulse(LaneId::One, 0, 200)]);
    }

    #[test]
    fn test_long_key_is_not_shortened() {
        let channel = SimChannel::new(ChannelConfig::ideal(0));
        let mut lanes = channel.lanes();
        lanes.start.assert().unwrap();
        channel.delay().delay_ms(500);
        lanes.start.deassert().unwrap();
        assert_eq!(channel.pulses()[0].duration_us, 500_000);
    }

    #[test]
    fn test_jitter_is_bounded_and_seeded() {
        let record = |seed| {
            let channel = SimChannel::new(ChannelConfig::noisy(seed).with_drop_rate(0.0));
            let mut lanes = channel.lanes();
            for _ in 0..32 {
                lanes.zero.assert().unwrap();
                channel.delay().delay_ms(50);
                lanes.zero.deassert().unwrap();
                channel.delay().delay_ms(250);
            }
            channel.take_pulses()
        };
        let a = record(3);
        assert_eq!(a, record(3));
        for p in &a {
            assert!((200_000..=240_000).contains(&p.duration_us));
        }
    }

    #[test]
    fn test_full_drop_rate_loses_everything() {
        let channel = SimChannel::new(ChannelConfig::ideal(0).with_drop_rate(1.0));
        let mut lanes = channel.lanes();
        lanes.end.assert().unwrap();
        lanes.end.deassert().unwrap();
        assert!(channel.pulses().is_empty());
        assert_eq!(channel.dropped(), 1);
    }

    #[test]
    fn test_await_pulse_outcomes() {
        let channel = SimChannel::replay(
            ChannelConfig::ideal(0),
            vec![pulse(LaneId::Zero, 0, 200), pulse(LaneId::Zero, 1_000, 200)],
        );
        let mut lanes = channel.lanes();

        // In the first pulse: swallow the rest of it.
        assert_eq!(
            lanes.zero.await_pulse(10_000, 250_000).unwrap(),
            PulseOutcome::AlreadyActive
        );
        assert_eq!(channel.now_us(), 200_000);

        // Too early for the second pulse.
        assert_eq!(lanes.zero.await_pulse(100_000, 250_000).unwrap(), PulseOutcome::TimedOut);
        assert_eq!(channel.now_us(), 300_000);

        assert_eq!(
            lanes.zero.await_pulse(1_000_000, 250_000).unwrap(),
            PulseOutcome::Elapsed(200_000)
        );
        assert_eq!(channel.now_us(), 1_200_000);
        assert!(!lanes.zero.read().unwrap());
        assert!(!lanes.one.read().unwrap());
    }

    #[test]
    fn test_recovery_bounds_a_stuck_lane() {
        let channel = SimChannel::replay(ChannelConfig::ideal(0), vec![pulse(LaneId::End, 0, 5_000)]);
        let mut lanes = channel.lanes();
        assert_eq!(
            lanes.end.await_pulse(100_000, 250_000).unwrap(),
            PulseOutcome::AlreadyActive
        );
        assert_eq!(channel.now_us(), 250_000);
        assert!(lanes.end.read().unwrap());
    }

    #[test]
    fn test_jitter_shortens_as_well_as_lengthens() {
        let channel = SimChannel::new(ChannelConfig::noisy(11).with_drop_rate(0.0));
        let mut lanes = channel.lanes();
        for _ in 0..64 {
            lanes.one.assert().unwrap();
            channel.delay().delay_ms(50);
            lanes.one.deassert().unwrap();
            channel.delay().delay_ms(250);
        }
        let widths: Vec<u64> = channel.pulses().iter().map(|p| p.duration_us).collect();
        assert!(widths.iter().any(|&w| w < 220_000));
        assert!(widths.iter().any(|&w| w > 220_000));
    }
}
