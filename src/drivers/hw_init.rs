//! GPIO output and LEDC PWM plumbing.
//!
//! Pins are claimed at runtime as devices are created, so unlike a fixed
//! board bring-up nothing is configured at boot.  LEDC timers are shared
//! between channels running at the same frequency; [`LedcAllocator`]
//! hands them out and takes them back.  The allocator is pure logic and
//! runs on the host too; the register writes are `espidf` only.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::debug;

use crate::error::HalError;
use crate::pins::Pin;

/// Low-speed LEDC channels available on the chip.
pub const LEDC_CHANNELS: usize = 8;
/// LEDC timers available on the chip.
pub const LEDC_TIMERS: usize = 4;
/// Duty resolution programmed on every LEDC timer.
pub const LEDC_RESOLUTION_BITS: u32 = 14;

// ── Channel allocation ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerSlot {
    freq_hz: u32,
    users: u8,
}

/// A channel and the timer it was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedcBinding {
    pub channel: u8,
    pub timer: u8,
    /// `true` when the timer was idle and must be (re)programmed.
    pub new_timer: bool,
}

/// Book-keeping for LEDC channels and timers.
#[derive(Debug, Default)]
pub struct LedcAllocator {
    channels: [Option<(Pin, u8)>; LEDC_CHANNELS],
    timers: [Option<TimerSlot>; LEDC_TIMERS],
}

impl LedcAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `pin` to a free channel on a timer running at `freq_hz`.
    pub fn claim(&mut self, pin: Pin, freq_hz: u32) -> Result<LedcBinding, HalError> {
        if let Some(binding) = self.binding(pin) {
            return Ok(binding);
        }
        let channel = self
            .channels
            .iter()
            .position(Option::is_none)
            .ok_or(HalError::NoFreeChannel(pin))?;

        let (timer, new_timer) = match self
            .timers
            .iter()
            .position(|t| t.is_some_and(|t| t.freq_hz == freq_hz))
        {
            Some(t) => (t, false),
            None => {
                let t = self
                    .timers
                    .iter()
                    .position(Option::is_none)
                    .ok_or(HalError::NoFreeChannel(pin))?;
                (t, true)
            }
        };

        let slot = self.timers[timer].get_or_insert(TimerSlot { freq_hz, users: 0 });
        slot.users += 1;
        self.channels[channel] = Some((pin, timer as u8));
        debug!("LEDC: GPIO{} -> channel {} timer {} ({} Hz)", pin, channel, timer, freq_hz);
        Ok(LedcBinding {
            channel: channel as u8,
            timer: timer as u8,
            new_timer,
        })
    }

    /// The channel currently driving `pin`.
    pub fn binding(&self, pin: Pin) -> Option<LedcBinding> {
        self.channels.iter().enumerate().find_map(|(ch, slot)| match slot {
            Some((p, timer)) if *p == pin => Some(LedcBinding {
                channel: ch as u8,
                timer: *timer,
                new_timer: false,
            }),
            _ => None,
        })
    }

    /// Free the channel behind `pin`.  Returns the binding and whether its
    /// timer became idle.
    pub fn release(&mut self, pin: Pin) -> Option<(LedcBinding, bool)> {
        let binding = self.binding(pin)?;
        self.channels[usize::from(binding.channel)] = None;
        let timer = &mut self.timers[usize::from(binding.timer)];
        let idle = match timer {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            *timer = None;
        }
        Some((binding, idle))
    }

    pub fn free_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.is_none()).count()
    }
}

/// Scale a 16-bit duty to the LEDC resolution.
pub fn scale_duty(duty: u16) -> u32 {
    u32::from(duty) >> (16 - LEDC_RESOLUTION_BITS)
}

// ── GPIO outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn gpio_output(pin: Pin, high: bool) -> Result<(), HalError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: gpio_config only touches the pad named in the mask; the pin
    // pool guarantees no other device owns it.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK {
        return Err(HalError::PinConfigFailed(pin));
    }
    gpio_write(pin, high)
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_output(pin: Pin, _high: bool) -> Result<(), HalError> {
    debug!("hw_init(sim): GPIO{} output", pin);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: Pin, high: bool) -> Result<(), HalError> {
    // SAFETY: gpio_set_level writes to an already-configured output pin.
    // Main-loop only.
    let ret = unsafe { gpio_set_level(i32::from(pin), u32::from(high)) };
    if ret != ESP_OK {
        return Err(HalError::GpioWriteFailed(pin));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: Pin, _high: bool) -> Result<(), HalError> {
    Ok(())
}

/// Return a pad to its reset state (input, no pulls).
#[cfg(target_os = "espidf")]
pub fn gpio_reset(pin: Pin) {
    // SAFETY: resetting a pad owned by the caller.
    unsafe {
        gpio_reset_pin(i32::from(pin));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_reset(pin: Pin) {
    debug!("hw_init(sim): GPIO{} reset", pin);
}

// ── LEDC PWM ─────────────────────────────────────────────────

/// Program the timer (when fresh) and attach the channel to `pin`.
#[cfg(target_os = "espidf")]
pub fn ledc_attach(pin: Pin, freq_hz: u32, binding: LedcBinding) -> Result<(), HalError> {
    // SAFETY: timer and channel numbers come from the allocator, which
    // never hands the same channel to two pins.  Main-loop only.
    unsafe {
        if binding.new_timer {
            let timer = ledc_timer_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                timer_num: u32::from(binding.timer),
                duty_resolution: LEDC_RESOLUTION_BITS,
                freq_hz,
                clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
                ..Default::default()
            };
            if ledc_timer_config(&timer) != ESP_OK {
                return Err(HalError::PinConfigFailed(pin));
            }
        }
        let ret = ledc_channel_config(&ledc_channel_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel: u32::from(binding.channel),
            timer_sel: u32::from(binding.timer),
            gpio_num: i32::from(pin),
            duty: 0,
            hpoint: 0,
            ..Default::default()
        });
        if ret != ESP_OK {
            return Err(HalError::PinConfigFailed(pin));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_attach(pin: Pin, freq_hz: u32, binding: LedcBinding) -> Result<(), HalError> {
    debug!(
        "hw_init(sim): GPIO{} on LEDC channel {} at {} Hz",
        pin, binding.channel, freq_hz
    );
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(pin: Pin, channel: u8, duty: u16) -> Result<(), HalError> {
    // SAFETY: channel was configured by ledc_attach(); only the main loop
    // writes duty registers.
    let ok = unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, u32::from(channel), scale_duty(duty))
            == ESP_OK
            && ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, u32::from(channel)) == ESP_OK
    };
    if !ok {
        return Err(HalError::PwmWriteFailed(pin));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_pin: Pin, _channel: u8, _duty: u16) -> Result<(), HalError> {
    Ok(())
}

/// Stop the channel and, when `timer_idle`, pause its timer.
#[cfg(target_os = "espidf")]
pub fn ledc_detach(binding: LedcBinding, timer_idle: bool) {
    // SAFETY: the binding was just released from the allocator.
    unsafe {
        ledc_stop(ledc_mode_t_LEDC_LOW_SPEED_MODE, u32::from(binding.channel), 0);
        if timer_idle {
            ledc_timer_pause(ledc_mode_t_LEDC_LOW_SPEED_MODE, u32::from(binding.timer));
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_detach(binding: LedcBinding, timer_idle: bool) {
    debug!(
        "hw_init(sim): LEDC channel {} stopped (timer idle: {})",
        binding.channel, timer_idle
    );
}
