//! Periodic timer multiplexer.
//!
//! The board has one periodic timer for device work.  Every device that
//! needs periodic service registers its id with the expected duration of
//! its callback; the timer period is the buffer plus the sum of those
//! durations, so one tick can service everyone in turn.
//!
//! ```text
//!   enqueue / dequeue / resume            tick (main loop)
//!          │                                   │
//!          ▼                                   ▼
//!   disarm ─▶ mutate map ─▶ re-arm       ids() in ascending order
//!                                         ─▶ Device::tick for each
//!                                         ─▶ record_tick(elapsed)
//! ```
//!
//! The timer is never reconfigured while armed: every change disarms,
//! mutates, then re-arms.  A hold (from the safety interlock) keeps the
//! timer disarmed while still accepting registrations.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::app::ports::TimerPort;
use crate::device::DeviceId;

/// The multiplexer.  Owns no callbacks, only ids; the registry resolves
/// each id to its device when a tick arrives.
#[derive(Debug)]
pub struct TimerMultiplexer {
    entries: BTreeMap<DeviceId, u32>,
    buffer_ms: u32,
    /// Period the hardware timer is armed at, if any.
    armed: Option<u32>,
    holds: u8,
    overruns: u32,
}

impl TimerMultiplexer {
    pub fn new(buffer_ms: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            buffer_ms,
            armed: None,
            holds: 0,
            overruns: 0,
        }
    }

    /// `buffer + Σ durations`.
    pub fn period_ms(&self) -> u32 {
        self.entries
            .values()
            .fold(self.buffer_ms, |acc, &d| acc.saturating_add(d))
    }

    /// Register or update `id`.
    pub fn enqueue<T: TimerPort + ?Sized>(&mut self, timer: &mut T, id: DeviceId, duration_ms: u32) {
        self.disarm(timer);
        self.entries.insert(id, duration_ms);
        debug!("Multiplexer: +{} ({} ms), {} entries", id, duration_ms, self.entries.len());
        self.rearm(timer);
    }

    /// Unregister `id`.  Unknown ids are ignored.
    pub fn dequeue<T: TimerPort + ?Sized>(&mut self, timer: &mut T, id: DeviceId) {
        if !self.entries.contains_key(&id) {
            return;
        }
        self.disarm(timer);
        self.entries.remove(&id);
        debug!("Multiplexer: -{}, {} entries", id, self.entries.len());
        self.rearm(timer);
    }

    /// Stop periodic work until a matching [`resume`](Self::resume).
    pub fn suspend<T: TimerPort + ?Sized>(&mut self, timer: &mut T) {
        self.holds = self.holds.saturating_add(1);
        self.disarm(timer);
        debug!("Multiplexer: suspended (holds={})", self.holds);
    }

    pub fn resume<T: TimerPort + ?Sized>(&mut self, timer: &mut T) {
        debug_assert!(self.holds > 0, "resume without suspend");
        self.holds = self.holds.saturating_sub(1);
        debug!("Multiplexer: resumed (holds={})", self.holds);
        self.rearm(timer);
    }

    /// Drop every entry and hold; leaves the timer disarmed.
    pub fn clear<T: TimerPort + ?Sized>(&mut self, timer: &mut T) {
        self.disarm(timer);
        self.entries.clear();
        self.holds = 0;
    }

    fn disarm<T: TimerPort + ?Sized>(&mut self, timer: &mut T) {
        if self.armed.take().is_some() {
            timer.disarm_periodic();
        }
    }

    fn rearm<T: TimerPort + ?Sized>(&mut self, timer: &mut T) {
        if self.armed.is_some() || self.holds > 0 || self.entries.is_empty() {
            return;
        }
        let period = self.period_ms();
        match timer.arm_periodic(period) {
            Ok(()) => {
                self.armed = Some(period);
                info!("Multiplexer: {} entries, period {} ms", self.entries.len(), period);
            }
            // Registrations are kept; the next change retries.
            Err(e) => warn!("Multiplexer: arming {} ms failed: {}", period, e),
        }
    }

    /// Registered ids in the order a tick services them.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.entries.keys().copied().collect()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Report how long a tick's callbacks took.  Running past the period
    /// only delays the next tick.
    pub fn record_tick(&mut self, elapsed_ms: u64) {
        let period = self.period_ms();
        if elapsed_ms > u64::from(period) {
            self.overruns = self.overruns.saturating_add(1);
            warn!(
                "Multiplexer: tick took {} ms, period is {} ms (overrun #{})",
                elapsed_ms, period, self.overruns
            );
        }
    }

    pub fn armed_period(&self) -> Option<u32> {
        self.armed
    }

    pub fn is_suspended(&self) -> bool {
        self.holds > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}
