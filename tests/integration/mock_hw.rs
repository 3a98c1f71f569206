//! Mock adapters for integration tests.
//!
//! Records every pin and timer call so tests can assert on the full
//! history without touching real GPIO/PWM registers.  Time is virtual:
//! `delay_ms` advances it and [`MockHardware::advance`] fires due
//! one-shots.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use railyard::app::events::AppEvent;
use railyard::app::ports::{
    ClockPort, EventSink, GpioPort, Rgb, StorageError, StoragePort, TimerPort,
};
use railyard::device::DeviceId;
use railyard::error::HalError;
use railyard::events::Event;
use railyard::pins::Pin;
use railyard::safety::Generation;

// ── Hardware call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    Write { pin: Pin, high: bool },
    Duty { pin: Pin, duty: u16 },
    Pixels { pin: Pin },
    ArmPeriodic(u32),
    DisarmPeriodic,
    ArmOneshot { id: DeviceId, delay_ms: u32 },
    CancelOneshot(DeviceId),
    Release(Pin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Output,
    Pwm,
    Pixels(u16),
}

// ── MockHardware ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockHardware {
    pub calls: Vec<HwCall>,
    modes: HashMap<Pin, Mode>,
    levels: HashMap<Pin, bool>,
    frames: HashMap<Pin, Vec<Rgb>>,
    periodic: Option<u32>,
    /// id -> (generation, deadline)
    oneshots: BTreeMap<DeviceId, (Generation, u64)>,
    now: u64,
    /// Pins whose writes fail.
    pub broken: Vec<Pin>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, pin: Pin) -> bool {
        self.levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn is_claimed(&self, pin: Pin) -> bool {
        self.modes.contains_key(&pin)
    }

    pub fn frame(&self, pin: Pin) -> Option<&[Rgb]> {
        self.frames.get(&pin).map(Vec::as_slice)
    }

    pub fn periodic(&self) -> Option<u32> {
        self.periodic
    }

    pub fn oneshot_pending(&self, id: DeviceId) -> bool {
        self.oneshots.contains_key(&id)
    }

    pub fn oneshot_generation(&self, id: DeviceId) -> Option<Generation> {
        self.oneshots.get(&id).map(|&(generation, _)| generation)
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn writes_to(&self, pin: Pin) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HwCall::Write { pin: p, .. } if *p == pin))
            .count()
    }

    /// Move the clock forward and return the timer events that fired.
    pub fn advance(&mut self, ms: u64) -> Vec<Event> {
        self.now += ms;
        let due: Vec<(DeviceId, Generation)> = self
            .oneshots
            .iter()
            .filter(|&(_, &(_, deadline))| deadline <= self.now)
            .map(|(&id, &(generation, _))| (id, generation))
            .collect();
        due.into_iter()
            .map(|(id, generation)| {
                self.oneshots.remove(&id);
                Event::SafetyTimeout(id, generation)
            })
            .collect()
    }
}

impl GpioPort for MockHardware {
    fn configure_output(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        self.modes.insert(pin, Mode::Output);
        self.levels.insert(pin, high);
        Ok(())
    }

    fn write(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        if self.broken.contains(&pin) || self.modes.get(&pin) != Some(&Mode::Output) {
            return Err(HalError::GpioWriteFailed(pin));
        }
        self.calls.push(HwCall::Write { pin, high });
        self.levels.insert(pin, high);
        Ok(())
    }

    fn read(&self, pin: Pin) -> bool {
        self.level(pin)
    }

    fn configure_pwm(&mut self, pin: Pin, _freq_hz: u32) -> Result<(), HalError> {
        self.modes.insert(pin, Mode::Pwm);
        Ok(())
    }

    fn set_duty(&mut self, pin: Pin, duty: u16) -> Result<(), HalError> {
        if self.broken.contains(&pin) || self.modes.get(&pin) != Some(&Mode::Pwm) {
            return Err(HalError::PwmWriteFailed(pin));
        }
        self.calls.push(HwCall::Duty { pin, duty });
        Ok(())
    }

    fn configure_pixels(&mut self, pin: Pin, count: u16) -> Result<(), HalError> {
        self.modes.insert(pin, Mode::Pixels(count));
        Ok(())
    }

    fn write_pixels(&mut self, pin: Pin, frame: &[Rgb]) -> Result<(), HalError> {
        match self.modes.get(&pin) {
            Some(&Mode::Pixels(n)) if usize::from(n) == frame.len() && !self.broken.contains(&pin) => {
                self.calls.push(HwCall::Pixels { pin });
                self.frames.insert(pin, frame.to_vec());
                Ok(())
            }
            _ => Err(HalError::PixelWriteFailed(pin)),
        }
    }

    fn release(&mut self, pin: Pin) {
        self.calls.push(HwCall::Release(pin));
        self.modes.remove(&pin);
        self.levels.remove(&pin);
    }
}

impl TimerPort for MockHardware {
    fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError> {
        assert!(self.periodic.is_none(), "periodic timer reprogrammed while armed");
        self.calls.push(HwCall::ArmPeriodic(period_ms));
        self.periodic = Some(period_ms);
        Ok(())
    }

    fn disarm_periodic(&mut self) {
        if self.periodic.take().is_some() {
            self.calls.push(HwCall::DisarmPeriodic);
        }
    }

    fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError> {
        self.calls.push(HwCall::ArmOneshot { id, delay_ms });
        self.oneshots.insert(id, (generation, self.now + u64::from(delay_ms)));
        Ok(())
    }

    fn cancel_oneshot(&mut self, id: DeviceId) {
        if self.oneshots.remove(&id).is_some() {
            self.calls.push(HwCall::CancelOneshot(id));
        }
    }
}

impl ClockPort for MockHardware {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}

// ── MockNvs ───────────────────────────────────────────────────

/// In-memory flash.  Clones share the same contents, so a test can keep
/// a handle to inspect what the service wrote or to "reboot" onto it.
#[derive(Default, Clone)]
pub struct MockNvs {
    store: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob, bypassing the port.
    pub fn blob(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.store.borrow().get(&format!("{}::{}", namespace, key)).cloned()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let k = format!("{}::{}", namespace, key);
        match self.store.borrow().get(&k) {
            Some(v) if v.len() > buf.len() => Err(StorageError::IoError),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Full);
        }
        let k = format!("{}::{}", namespace, key);
        self.store.borrow_mut().insert(k, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.borrow_mut().remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.borrow().contains_key(&format!("{}::{}", namespace, key))
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}::", namespace);
        Ok(self
            .store
            .borrow()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_owned))
            .collect())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
