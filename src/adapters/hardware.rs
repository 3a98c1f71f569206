//! Hardware adapter: bridges the board to the domain port traits.
//!
//! Owns the LEDC allocator, the pixel strips, the timers and the clock,
//! and exposes them through [`GpioPort`], [`TimerPort`] and
//! [`ClockPort`].  This is the only module in the system that touches
//! actual hardware.  On non-espidf targets the underlying drivers use
//! cfg-gated simulation stubs.

use std::collections::BTreeMap;

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::adapters::time::SystemClock;
use crate::app::ports::{ClockPort, GpioPort, Rgb, TimerPort};
use crate::device::DeviceId;
use crate::drivers::hw_init::{self, LedcAllocator};
use crate::drivers::hw_timer::HwTimers;
use crate::drivers::pixels::PixelStrips;
use crate::error::HalError;
use crate::pins::{MAX_PINS, Pin, is_accessory_pin};
use crate::safety::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinMode {
    Output,
    Pwm { channel: u8 },
    Pixels,
}

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    modes: BTreeMap<Pin, PinMode>,
    /// Output latch, one bit per pin.
    levels: u64,
    ledc: LedcAllocator,
    pixels: PixelStrips,
    timers: HwTimers,
    clock: SystemClock,
}

impl HardwareAdapter {
    pub fn new(timers: HwTimers, clock: SystemClock) -> Self {
        Self {
            modes: BTreeMap::new(),
            levels: 0,
            ledc: LedcAllocator::new(),
            pixels: PixelStrips::new(),
            timers,
            clock,
        }
    }

    /// Refuses straps, flash and USB lines so a bad profile can never drive
    /// them.
    fn check_pin(pin: Pin) -> Result<(), HalError> {
        if !is_accessory_pin(pin) {
            return Err(HalError::PinConfigFailed(pin));
        }
        Ok(())
    }

    fn set_latch(&mut self, pin: Pin, high: bool) {
        if high {
            self.levels |= 1 << pin;
        } else {
            self.levels &= !(1 << pin);
        }
    }

    /// Drop whatever `pin` was driving before taking it over.
    fn reclaim(&mut self, pin: Pin) {
        if self.modes.contains_key(&pin) {
            self.release(pin);
        }
    }

    /// Deliver due simulated timer expiries.
    #[cfg(not(target_os = "espidf"))]
    pub fn poll_timers(&mut self, fire: impl FnMut(crate::events::Event)) {
        let now = self.clock.uptime_ms();
        self.timers.poll(now, fire);
    }
}

// ── GpioPort implementation ───────────────────────────────────

impl GpioPort for HardwareAdapter {
    fn configure_output(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        self.reclaim(pin);
        hw_init::gpio_output(pin, high)?;
        self.modes.insert(pin, PinMode::Output);
        self.set_latch(pin, high);
        Ok(())
    }

    fn write(&mut self, pin: Pin, high: bool) -> Result<(), HalError> {
        if self.modes.get(&pin) != Some(&PinMode::Output) {
            return Err(HalError::GpioWriteFailed(pin));
        }
        hw_init::gpio_write(pin, high)?;
        self.set_latch(pin, high);
        Ok(())
    }

    fn read(&self, pin: Pin) -> bool {
        pin < MAX_PINS && self.levels & (1 << pin) != 0
    }

    fn configure_pwm(&mut self, pin: Pin, freq_hz: u32) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        self.reclaim(pin);
        let binding = self.ledc.claim(pin, freq_hz)?;
        if let Err(e) = hw_init::ledc_attach(pin, freq_hz, binding) {
            self.ledc.release(pin);
            return Err(e);
        }
        self.modes.insert(
            pin,
            PinMode::Pwm {
                channel: binding.channel,
            },
        );
        Ok(())
    }

    fn set_duty(&mut self, pin: Pin, duty: u16) -> Result<(), HalError> {
        match self.modes.get(&pin) {
            Some(&PinMode::Pwm { channel }) => hw_init::ledc_set(pin, channel, duty),
            _ => Err(HalError::PwmWriteFailed(pin)),
        }
    }

    fn configure_pixels(&mut self, pin: Pin, count: u16) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        if self.modes.get(&pin) != Some(&PinMode::Pixels) {
            self.reclaim(pin);
        }
        self.pixels.configure(pin, count)?;
        self.modes.insert(pin, PinMode::Pixels);
        Ok(())
    }

    fn write_pixels(&mut self, pin: Pin, frame: &[Rgb]) -> Result<(), HalError> {
        self.pixels.write(pin, frame)
    }

    fn release(&mut self, pin: Pin) {
        match self.modes.remove(&pin) {
            Some(PinMode::Output) => {}
            Some(PinMode::Pwm { .. }) => {
                if let Some((binding, idle)) = self.ledc.release(pin) {
                    hw_init::ledc_detach(binding, idle);
                }
            }
            Some(PinMode::Pixels) => {
                self.pixels.release(pin);
            }
            None => return,
        }
        hw_init::gpio_reset(pin);
        self.set_latch(pin, false);
        debug!("Hardware: GPIO{} released", pin);
    }
}

// ── TimerPort implementation ──────────────────────────────────

impl TimerPort for HardwareAdapter {
    #[cfg(target_os = "espidf")]
    fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError> {
        self.timers.arm_periodic(period_ms)
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError> {
        let now = self.clock.uptime_ms();
        self.timers.arm_periodic(period_ms, now)
    }

    fn disarm_periodic(&mut self) {
        self.timers.disarm_periodic();
    }

    #[cfg(target_os = "espidf")]
    fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError> {
        self.timers.arm_oneshot(id, generation, delay_ms)
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError> {
        let now = self.clock.uptime_ms();
        self.timers.arm_oneshot(id, generation, delay_ms, now)
    }

    fn cancel_oneshot(&mut self, id: DeviceId) {
        self.timers.cancel_oneshot(id);
    }
}

// ── ClockPort implementation ──────────────────────────────────

impl ClockPort for HardwareAdapter {
    fn now_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    fn delay_ms(&mut self, ms: u32) {
        DelayNs::delay_ms(&mut self.clock, ms);
    }
}
