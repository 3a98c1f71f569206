//! One-shot safety interlock.
//!
//! Bookkeeping for the per-device one-shot timers that force
//! safety-critical outputs off.  The timer callback itself does nothing
//! but queue `Event::SafetyTimeout(id, generation)`; the main loop asks
//! [`take_expired`](SafetyInterlock::take_expired) whether that event still
//! belongs to the live arming before acting on it.
//!
//! ## Lifecycle
//!
//! 1. `arm(id)` cancels any stale one-shot for `id`, then starts a new one
//!    tagged with a fresh generation.
//! 2. `cancel(id)` stops it; a late event for it is then ignored.
//! 3. When the event arrives, `take_expired(id, generation)` consumes the
//!    arming only if both match, and the device performs its shutdown.
//! 4. If the event never arrives (queue overflow), [`overdue`] reports the
//!    arming once its deadline plus [`OVERDUE_GRACE_MS`] has passed, and
//!    the main loop shuts the device down itself.
//!
//! [`overdue`]: SafetyInterlock::overdue

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::app::ports::Hardware;
use crate::device::DeviceId;
use crate::error::HalError;

/// Distinguishes successive armings of the same device.  Wraps; 256
/// re-arms would have to happen while one expiry sits in the queue.
pub type Generation = u8;

/// How long past its deadline an undelivered expiry is forced.
pub const OVERDUE_GRACE_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arming {
    generation: Generation,
    deadline_ms: u64,
}

#[derive(Debug, Default)]
pub struct SafetyInterlock {
    armed: BTreeMap<DeviceId, Arming>,
    next_generation: Generation,
}

impl SafetyInterlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a `delay_ms` one-shot for `id`.
    pub fn arm<H: Hardware + ?Sized>(&mut self, hw: &mut H, id: DeviceId, delay_ms: u32) -> Result<(), HalError> {
        if self.armed.remove(&id).is_some() {
            debug!("Interlock: replacing one-shot for device {}", id);
            hw.cancel_oneshot(id);
        }
        let generation = self.next_generation;
        self.next_generation = generation.wrapping_add(1);
        hw.arm_oneshot(id, generation, delay_ms).inspect_err(|e| {
            warn!("Interlock: arming device {} failed: {}", id, e);
        })?;
        self.armed.insert(
            id,
            Arming {
                generation,
                deadline_ms: hw.now_ms() + u64::from(delay_ms),
            },
        );
        info!("Interlock: device {} armed for {} ms (gen {})", id, delay_ms, generation);
        Ok(())
    }

    /// Stop the one-shot for `id`.  No-op when none is pending.
    pub fn cancel<H: Hardware + ?Sized>(&mut self, hw: &mut H, id: DeviceId) {
        if self.armed.remove(&id).is_some() {
            hw.cancel_oneshot(id);
            debug!("Interlock: device {} cancelled", id);
        }
    }

    /// Consume the arming for an expiry event.  `false` means the event is
    /// stale (cancelled or replaced before delivery) and must be ignored.
    pub fn take_expired(&mut self, id: DeviceId, generation: Generation) -> bool {
        match self.armed.get(&id) {
            Some(arming) if arming.generation == generation => {
                self.armed.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Armings whose expiry should have been delivered by `now_ms` and
    /// was not.
    pub fn overdue(&self, now_ms: u64) -> Vec<(DeviceId, Generation)> {
        self.armed
            .iter()
            .filter(|(_, a)| a.deadline_ms + OVERDUE_GRACE_MS <= now_ms)
            .map(|(&id, a)| (id, a.generation))
            .collect()
    }

    pub fn is_armed(&self, id: DeviceId) -> bool {
        self.armed.contains_key(&id)
    }

    /// Generation of the live arming for `id`.
    pub fn generation(&self, id: DeviceId) -> Option<Generation> {
        self.armed.get(&id).map(|a| a.generation)
    }

    pub fn pending(&self) -> usize {
        self.armed.len()
    }
}
