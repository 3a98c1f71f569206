//! Momentary motors: continuous-rotation servo, DC motor, stepper.
//!
//! All three are stateless.  "next" and "last" each run the motor for a
//! bounded time and then stop it, blocking the caller meanwhile.

use log::warn;

use super::servo::{SERVO_FREQ_HZ, pulse_to_duty};
use super::{
    BuildContext, Command, Driver, EffectSummary, Line, MAX_DEVICE_PINS, claim_lines, claim_pwm, release_all,
    set_lines, summary,
};
use crate::app::ports::Hardware;
use crate::error::DeviceError;
use crate::pins::Pin;

fn stop_all(hw: &mut dyn Hardware, pins: &[Pin], what: &str) {
    for &pin in pins {
        if let Err(e) = hw.set_duty(pin, 0) {
            warn!("{}: GPIO{} stop failed: {}", what, pin, e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Continuous servo
// ───────────────────────────────────────────────────────────────

const CS_MIN_PULSE_US: u32 = 1000;
const CS_MAX_PULSE_US: u32 = 2000;

#[derive(Debug)]
pub struct ContinuousServo {
    pins: heapless::Vec<Pin, MAX_DEVICE_PINS>,
    /// Offset from standstill, percent of the half range.
    speed_pct: u8,
    run_ms: u32,
}

pub(crate) fn build_continuous_servo(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    Ok(Driver::ContinuousServo(ContinuousServo {
        pins: claim_pwm(ctx.hw, ctx.pins, SERVO_FREQ_HZ)?,
        speed_pct: ctx.config.continuous_servo_speed_pct.min(50),
        run_ms: ctx.config.motor_run_ms,
    }))
}

impl ContinuousServo {
    /// Pulse width for `value` percent of the range; 50 is standstill.
    fn pulse_us(value_pct: u32) -> u32 {
        CS_MIN_PULSE_US + (CS_MAX_PULSE_US - CS_MIN_PULSE_US) * value_pct / 100
    }

    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let value = match cmd {
            Command::On => 50 - u32::from(self.speed_pct),
            Command::Off => 50 + u32::from(self.speed_pct),
            Command::Neutral => {
                for &pin in &self.pins {
                    hw.set_duty(pin, 0)?;
                }
                return Ok(summary(format_args!("stopped")));
            }
        };
        let duty = pulse_to_duty(Self::pulse_us(value));
        for &pin in &self.pins {
            if let Err(e) = hw.set_duty(pin, duty) {
                stop_all(hw, &self.pins, "ContinuousServo");
                return Err(e.into());
            }
        }
        hw.delay_ms(self.run_ms);
        for &pin in &self.pins {
            hw.set_duty(pin, 0)?;
        }
        Ok(summary(format_args!("ran {}ms at {}%", self.run_ms, value)))
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        stop_all(hw, &self.pins, "ContinuousServo");
        release_all(hw, self.pins.iter().copied());
    }
}

// ───────────────────────────────────────────────────────────────
// DC motor (H-bridge, one PWM line per direction)
// ───────────────────────────────────────────────────────────────

pub const DC_MOTOR_FREQ_HZ: u32 = 100;

#[derive(Debug)]
pub struct DcMotor {
    forward: Pin,
    backward: Pin,
    run_ms: u32,
}

pub(crate) fn build_dc_motor(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    let pins = claim_pwm(ctx.hw, ctx.pins, DC_MOTOR_FREQ_HZ)?;
    Ok(Driver::DcMotor(DcMotor {
        forward: pins[0],
        backward: pins[1],
        run_ms: ctx.config.motor_run_ms,
    }))
}

impl DcMotor {
    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let (drive, idle, dir) = match cmd {
            Command::On => (self.forward, self.backward, "forward"),
            Command::Off => (self.backward, self.forward, "backward"),
            Command::Neutral => {
                hw.set_duty(self.forward, 0)?;
                hw.set_duty(self.backward, 0)?;
                return Ok(summary(format_args!("stopped")));
            }
        };
        hw.set_duty(idle, 0)?;
        if let Err(e) = hw.set_duty(drive, u16::MAX) {
            stop_all(hw, &[self.forward, self.backward], "DCMotor");
            return Err(e.into());
        }
        hw.delay_ms(self.run_ms);
        hw.set_duty(drive, 0)?;
        Ok(summary(format_args!("{} {}ms", dir, self.run_ms)))
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        stop_all(hw, &[self.forward, self.backward], "DCMotor");
        release_all(hw, [self.forward, self.backward].into_iter());
    }
}

// ───────────────────────────────────────────────────────────────
// Stepper (direction + step lines on a driver board)
// ───────────────────────────────────────────────────────────────

pub const MAX_STEPPER_STEPS: u32 = 10_000;

#[derive(Debug)]
pub struct Stepper {
    direction: Line,
    step: Line,
    steps: u32,
    delay_ms: u32,
}

pub(crate) fn build_stepper(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    let lines = claim_lines(ctx.hw, ctx.pins, true)?;
    Ok(Driver::Stepper(Stepper {
        direction: lines[0],
        step: lines[1],
        steps: ctx.config.stepper_steps,
        delay_ms: ctx.config.stepper_delay_ms,
    }))
}

impl Stepper {
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn set_steps(&mut self, steps: u32) -> Result<(), DeviceError> {
        if steps > MAX_STEPPER_STEPS {
            return Err(DeviceError::InvalidParameter("stepper steps must be 0-10000"));
        }
        self.steps = steps;
        Ok(())
    }

    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let forward = match cmd {
            Command::On => true,
            Command::Off => false,
            // No sleep/enable line on the driver board.
            Command::Neutral => return Ok(summary(format_args!("idle"))),
        };
        self.direction.set(hw, forward)?;
        for _ in 0..self.steps {
            self.step.set(hw, true)?;
            hw.delay_ms(self.delay_ms);
            self.step.set(hw, false)?;
            hw.delay_ms(self.delay_ms);
        }
        Ok(summary(format_args!(
            "{} {} steps",
            if forward { "forward" } else { "backward" },
            self.steps
        )))
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        let lines = [self.direction, self.step];
        if let Err(e) = set_lines(hw, &lines, false) {
            warn!("Stepper: idle on close failed: {}", e);
        }
        release_all(hw, lines.iter().map(|l| l.pin));
    }
}
