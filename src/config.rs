//! System configuration parameters
//!
//! All tunable parameters for the Railyard controller.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::pins::{ACCESSORY_MASK, CHIP_GPIO_COUNT, MAX_PINS};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Board ---
    /// GPIOs at or above this are never handed out, even if the board
    /// map allows them
    pub pin_count: u8,
    /// Log every device transition at info level
    pub verbose: bool,

    // --- Relays ---
    /// How long a relay coil is pulsed (milliseconds)
    pub blink_ms: u32,
    /// Disconnect relays are forced off after this long (seconds)
    pub safe_shutdown_secs: u32,

    // --- Timers ---
    /// Slack added to the multiplexed periodic timer (milliseconds)
    pub timer_buffer_ms: u32,
    /// Delay between a reset request and the restart (seconds)
    pub reset_wait_secs: u32,

    // --- Servos ---
    /// Servo angle for the "turn" position (degrees)
    pub servo_min_angle: u16,
    /// Servo angle for the "straight" position (degrees)
    pub servo_max_angle: u16,

    // --- Motors ---
    /// Run time of one DC / continuous-servo pulse (milliseconds)
    pub motor_run_ms: u32,
    /// Continuous servo speed offset from neutral (percent of half-range)
    pub continuous_servo_speed_pct: u8,
    /// Stepper steps per command
    pub stepper_steps: u32,
    /// Stepper half-period (milliseconds)
    pub stepper_delay_ms: u32,

    // --- Light beams ---
    /// Pixel count when none is given
    pub beam_pixels: u16,
    /// Beam colour when none is given
    pub beam_rgb: (u8, u8, u8),
    /// Per-step delay (milliseconds)
    pub beam_delay_ms: u32,
    /// Number of lit pixels in the beam
    pub beam_length: u16,
    /// Slide back after reaching the end
    pub beam_reverse: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Board
            pin_count: CHIP_GPIO_COUNT, // GPIO0..GPIO48
            verbose: false,

            // Relays
            blink_ms: 100,
            safe_shutdown_secs: 4,

            // Timers
            timer_buffer_ms: 100,
            reset_wait_secs: 3,

            // Servos
            servo_min_angle: 0,
            servo_max_angle: 80,

            // Motors
            motor_run_ms: 1000,
            continuous_servo_speed_pct: 45,
            stepper_steps: 30,
            stepper_delay_ms: 66,

            // Light beams
            beam_pixels: 8,
            beam_rgb: (10, 0, 0),
            beam_delay_ms: 10,
            beam_length: 3,
            beam_reverse: false,
        }
    }
}

impl SystemConfig {
    /// Accessory GPIOs below `pin_count`.
    pub fn pin_universe(&self) -> u64 {
        let below = match self.pin_count.min(MAX_PINS) {
            MAX_PINS => u64::MAX,
            n => (1u64 << n) - 1,
        };
        ACCESSORY_MASK & below
    }

    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.pin_count) {
            return Err(ConfigError::ValidationFailed("pin_count must be 1–64"));
        }
        if !(10..=2000).contains(&self.blink_ms) {
            return Err(ConfigError::ValidationFailed("blink_ms must be 10–2000"));
        }
        if !(1..=60).contains(&self.safe_shutdown_secs) {
            return Err(ConfigError::ValidationFailed(
                "safe_shutdown_secs must be 1–60",
            ));
        }
        if self.timer_buffer_ms > 10_000 {
            return Err(ConfigError::ValidationFailed(
                "timer_buffer_ms must be 0–10000",
            ));
        }
        if self.reset_wait_secs > 60 {
            return Err(ConfigError::ValidationFailed("reset_wait_secs must be 0–60"));
        }
        if self.servo_min_angle >= self.servo_max_angle || self.servo_max_angle > 180 {
            return Err(ConfigError::ValidationFailed(
                "servo angles must satisfy min < max <= 180",
            ));
        }
        if !(1..=10_000).contains(&self.motor_run_ms) {
            return Err(ConfigError::ValidationFailed("motor_run_ms must be 1–10000"));
        }
        if self.continuous_servo_speed_pct > 50 {
            return Err(ConfigError::ValidationFailed(
                "continuous_servo_speed_pct must be 0–50",
            ));
        }
        if self.stepper_steps > 10_000 {
            return Err(ConfigError::ValidationFailed("stepper_steps must be 0–10000"));
        }
        if !(1..=1000).contains(&self.stepper_delay_ms) {
            return Err(ConfigError::ValidationFailed(
                "stepper_delay_ms must be 1–1000",
            ));
        }
        if self.beam_pixels == 0 || self.beam_length == 0 || self.beam_length > self.beam_pixels {
            return Err(ConfigError::ValidationFailed(
                "beam_length must be 1..=beam_pixels",
            ));
        }
        Ok(())
    }
}
