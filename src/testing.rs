//! In-crate fake board for unit tests.
//!
//! Records every port call so tests can assert on the full history
//! (edges, duty sequences, frames, timer programming) and runs a virtual
//! clock that `delay_ms` advances instantly.

use std::collections::{BTreeMap, BTreeSet};

use crate::app::ports::{ClockPort, GpioPort, Rgb, TimerPort};
use crate::device::DeviceId;
use crate::error::HalError;
use crate::pins::Pin;
use crate::safety::Generation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    Configure { pin: Pin, high: bool },
    Write { pin: Pin, high: bool },
    Duty { pin: Pin, duty: u16 },
    Release { pin: Pin },
    ArmPeriodic { period_ms: u32 },
    DisarmPeriodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Output,
    Pwm { freq_hz: u32 },
    Pixels { count: u16 },
}

#[derive(Debug, Default)]
pub struct FakeHardware {
    pub calls: Vec<HwCall>,
    now_ms: u64,
    modes: BTreeMap<Pin, Mode>,
    levels: BTreeMap<Pin, bool>,
    duties: BTreeMap<Pin, u16>,
    frames: BTreeMap<Pin, Vec<Vec<Rgb>>>,
    periodic: Option<u32>,
    /// id -> (generation, delay, deadline)
    oneshots: BTreeMap<DeviceId, (Generation, u32, u64)>,
    fail_config: BTreeSet<Pin>,
    fail_writes: BTreeSet<Pin>,
    fail_timers: bool,
}

impl FakeHardware {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Fault injection ───────────────────────────────────────

    pub fn fail_config_on(&mut self, pin: Pin) {
        self.fail_config.insert(pin);
    }

    pub fn fail_writes_on(&mut self, pin: Pin) {
        self.fail_writes.insert(pin);
    }

    pub fn fail_timers(&mut self, fail: bool) {
        self.fail_timers = fail;
    }

    // ── Clock ─────────────────────────────────────────────────

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    /// One-shots due at the current time, removed as if they fired.
    pub fn fire_due_oneshots(&mut self) -> Vec<(DeviceId, Generation)> {
        let now = self.now_ms;
        let due: Vec<(DeviceId, Generation)> = self
            .oneshots
            .iter()
            .filter(|(_, (_, _, deadline))| *deadline <= now)
            .map(|(&id, &(generation, _, _))| (id, generation))
            .collect();
        for (id, _) in &due {
            self.oneshots.remove(id);
        }
        due
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn level(&self, pin: Pin) -> bool {
        self.levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn is_configured(&self, pin: Pin) -> bool {
        self.modes.contains_key(&pin)
    }

    pub fn write_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, HwCall::Write { .. })).count()
    }

    /// Level transitions driven by writes, counted from the level each
    /// `configure_output` set.
    fn edges(&self, pin: Pin, rising: bool) -> usize {
        let mut level = false;
        let mut edges = 0;
        for c in &self.calls {
            match *c {
                HwCall::Configure { pin: p, high } if p == pin => level = high,
                HwCall::Write { pin: p, high } if p == pin => {
                    if level != high && high == rising {
                        edges += 1;
                    }
                    level = high;
                }
                _ => {}
            }
        }
        edges
    }

    pub fn rising_edges(&self, pin: Pin) -> usize {
        self.edges(pin, true)
    }

    pub fn falling_edges(&self, pin: Pin) -> usize {
        self.edges(pin, false)
    }

    pub fn release_count(&self, pin: Pin) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HwCall::Release { pin: p } if *p == pin))
            .count()
    }

    pub fn pwm_freq(&self, pin: Pin) -> Option<u32> {
        match self.modes.get(&pin) {
            Some(Mode::Pwm { freq_hz }) => Some(*freq_hz),
            _ => None,
        }
    }

    pub fn duty(&self, pin: Pin) -> u16 {
        self.duties.get(&pin).copied().unwrap_or(0)
    }

    pub fn duty_history(&self, pin: Pin) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HwCall::Duty { pin: p, duty } if *p == pin => Some(*duty),
                _ => None,
            })
            .collect()
    }

    pub fn pixel_frames(&self, pin: Pin) -> &[Vec<Rgb>] {
        self.frames.get(&pin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pixel_writes(&self, pin: Pin) -> usize {
        self.pixel_frames(pin).len()
    }

    /// `Some(period)` per arm, `None` per disarm.
    pub fn periodic_history(&self) -> Vec<Option<u32>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HwCall::ArmPeriodic { period_ms } => Some(Some(*period_ms)),
                HwCall::DisarmPeriodic => Some(None),
                _ => None,
            })
            .collect()
    }

    pub fn periodic(&self) -> Option<u32> {
        self.periodic
    }

    pub fn oneshot_delay(&self, id: DeviceId) -> Option<u32> {
        self.oneshots.get(&id).map(|&(_, delay, _)| delay)
    }

    pub fn oneshot_deadline(&self, id: DeviceId) -> Option<u64> {
        self.oneshots.get(&id).map(|&(_, _, deadline)| deadline)
    }

    pub fn oneshot_generation(&self, id: DeviceId) -> Option<Generation> {
        self.oneshots.get(&id).map(|&(generation, _, _)| generation)
    }
}

impl GpioPort for FakeHardware {
    fn configure_output(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        if self.fail_config.contains(&pin) {
            return Err(HalError::PinConfigFailed(pin));
        }
        self.modes.insert(pin, Mode::Output);
        self.levels.insert(pin, high);
        self.calls.push(HwCall::Configure { pin, high });
        Ok(())
    }

    fn write(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        if self.fail_writes.contains(&pin) || self.modes.get(&pin) != Some(&Mode::Output) {
            return Err(HalError::GpioWriteFailed(pin));
        }
        self.levels.insert(pin, high);
        self.calls.push(HwCall::Write { pin, high });
        Ok(())
    }

    fn read(&self, pin: Pin) -> bool {
        self.level(pin)
    }

    fn configure_pwm(&mut self, pin: Pin, freq_hz: u32) -> Result<(), HalError> {
        if self.fail_config.contains(&pin) {
            return Err(HalError::PinConfigFailed(pin));
        }
        self.modes.insert(pin, Mode::Pwm { freq_hz });
        self.duties.insert(pin, 0);
        Ok(())
    }

    fn set_duty(&mut self, pin: Pin, duty: u16) -> Result<(), HalError> {
        if self.fail_writes.contains(&pin) || !matches!(self.modes.get(&pin), Some(Mode::Pwm { .. })) {
            return Err(HalError::PwmWriteFailed(pin));
        }
        self.duties.insert(pin, duty);
        self.calls.push(HwCall::Duty { pin, duty });
        Ok(())
    }

    fn configure_pixels(&mut self, pin: Pin, count: u16) -> Result<(), HalError> {
        if self.fail_config.contains(&pin) {
            return Err(HalError::PinConfigFailed(pin));
        }
        self.modes.insert(pin, Mode::Pixels { count });
        Ok(())
    }

    fn write_pixels(&mut self, pin: Pin, frame: &[Rgb]) -> Result<(), HalError> {
        match self.modes.get(&pin) {
            Some(&Mode::Pixels { count }) if !self.fail_writes.contains(&pin) && usize::from(count) == frame.len() => {
                self.frames.entry(pin).or_default().push(frame.to_vec());
                Ok(())
            }
            _ => Err(HalError::PixelWriteFailed(pin)),
        }
    }

    fn release(&mut self, pin: Pin) {
        self.modes.remove(&pin);
        self.levels.remove(&pin);
        self.duties.remove(&pin);
        self.calls.push(HwCall::Release { pin });
    }
}

impl TimerPort for FakeHardware {
    fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError> {
        assert!(self.periodic.is_none(), "periodic timer reprogrammed while armed");
        if self.fail_timers {
            return Err(HalError::TimerFailed);
        }
        self.periodic = Some(period_ms);
        self.calls.push(HwCall::ArmPeriodic { period_ms });
        Ok(())
    }

    fn disarm_periodic(&mut self) {
        if self.periodic.take().is_some() {
            self.calls.push(HwCall::DisarmPeriodic);
        }
    }

    fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError> {
        assert!(!self.oneshots.contains_key(&id), "one-shot {id} armed twice");
        if self.fail_timers {
            return Err(HalError::TimerFailed);
        }
        self.oneshots.insert(id, (generation, delay_ms, self.now_ms + u64::from(delay_ms)));
        Ok(())
    }

    fn cancel_oneshot(&mut self, id: DeviceId) {
        self.oneshots.remove(&id);
    }
}

impl ClockPort for FakeHardware {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_ms += u64::from(ms);
    }
}
