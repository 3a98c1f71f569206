//! Pool of unowned GPIOs.
//!
//! A 64-bit mask over the board's pin universe, which the caller derives
//! from [`ACCESSORY_MASK`](crate::pins::ACCESSORY_MASK).  Pins leave the pool when a
//! device is constructed on them and come back when it is closed; the
//! registry is the only caller, so pool and registry always change in the
//! same step.

use log::debug;

use crate::device::PinSet;
use crate::error::DeviceError;
use crate::pins::{MAX_PINS, Pin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPool {
    universe: u64,
    free: u64,
}

impl PinPool {
    /// Pool over the pins set in `universe`, all free.
    pub fn new(universe: u64) -> Self {
        Self {
            universe,
            free: universe,
        }
    }

    pub fn is_free(&self, pin: Pin) -> bool {
        pin < MAX_PINS && self.free & (1u64 << pin) != 0
    }

    /// Take every pin in `pins`, or none of them.
    ///
    /// Fails naming the lowest pin that is owned or off the board.
    pub fn allocate(&mut self, pins: &PinSet) -> Result<(), DeviceError> {
        if let Some(&taken) = pins.iter().find(|&&p| !self.is_free(p)) {
            return Err(DeviceError::PinUnavailable(taken));
        }
        self.free &= !pins.mask();
        debug!("PinPool: allocated {}", pins);
        Ok(())
    }

    /// Return pins to the pool.
    pub fn release(&mut self, pins: &PinSet) {
        let mask = pins.mask();
        debug_assert_eq!(self.free & mask, 0, "double release of {pins}");
        debug_assert_eq!(mask & !self.universe, 0, "{pins} is off the board");
        self.free |= mask & self.universe;
        debug!("PinPool: released {}", pins);
    }

    /// Every pin free again.
    pub fn reset(&mut self) {
        self.free = self.universe;
    }

    /// Free pins in ascending order.
    pub fn available(&self) -> Vec<Pin> {
        (0..MAX_PINS).filter(|&p| self.is_free(p)).collect()
    }

    pub fn free_mask(&self) -> u64 {
        self.free
    }

    pub fn universe_mask(&self) -> u64 {
        self.universe
    }
}
