//! Angle-mapped servo train switch.

use log::warn;

use super::{BuildContext, Command, Driver, EffectSummary, MAX_DEVICE_PINS, claim_pwm, release_all, summary};
use crate::app::ports::Hardware;
use crate::error::DeviceError;
use crate::pins::Pin;

pub const SERVO_FREQ_HZ: u32 = 50;
const FRAME_US: u32 = 1_000_000 / SERVO_FREQ_HZ;
const MIN_PULSE_US: u32 = 400;
const MAX_PULSE_US: u32 = 2400;

/// 16-bit duty for a pulse of `pulse_us` in a 50 Hz frame.
pub(crate) fn pulse_to_duty(pulse_us: u32) -> u16 {
    (pulse_us.min(FRAME_US) * u32::from(u16::MAX) / FRAME_US) as u16
}

#[derive(Debug)]
pub struct Servo {
    pins: heapless::Vec<Pin, MAX_DEVICE_PINS>,
    /// Angles the pulse range is calibrated against.
    cal_min: u16,
    cal_max: u16,
    /// "turn" and "straight" positions, inside the calibration.
    min_angle: u16,
    max_angle: u16,
    /// Position last driven; `None` while the signal is off.
    holding: Option<Command>,
}

pub(crate) fn build(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    let (cal_min, cal_max) = (ctx.config.servo_min_angle, ctx.config.servo_max_angle);
    if cal_min >= cal_max {
        return Err(DeviceError::InvalidParameter("servo angles must satisfy min < max"));
    }
    Ok(Driver::Servo(Servo {
        pins: claim_pwm(ctx.hw, ctx.pins, SERVO_FREQ_HZ)?,
        cal_min,
        cal_max,
        min_angle: cal_min,
        max_angle: cal_max,
        holding: None,
    }))
}

impl Servo {
    pub fn duty_for(&self, angle: u16) -> u16 {
        let span = u32::from(self.cal_max - self.cal_min);
        let offset = u32::from(angle.clamp(self.cal_min, self.cal_max) - self.cal_min);
        pulse_to_duty(MIN_PULSE_US + (MAX_PULSE_US - MIN_PULSE_US) * offset / span)
    }

    /// Travel between the two positions, in degrees.
    pub fn steps(&self) -> u32 {
        u32::from(self.max_angle - self.min_angle)
    }

    /// Move the "straight" position to `steps` degrees past "turn".  A
    /// servo holding a position is driven to its new angle at once.
    pub fn set_steps(&mut self, hw: &mut dyn Hardware, steps: u32) -> Result<(), DeviceError> {
        let span = u32::from(self.cal_max - self.cal_min);
        if steps == 0 || steps > span {
            return Err(DeviceError::InvalidParameter("servo steps outside calibrated travel"));
        }
        self.min_angle = self.cal_min;
        self.max_angle = self.cal_min + steps as u16;
        if let Some(cmd) = self.holding {
            self.apply(hw, cmd)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let angle = match cmd {
            Command::On => Some(self.max_angle),
            Command::Off => Some(self.min_angle),
            Command::Neutral => None,
        };
        let duty = angle.map_or(0, |a| self.duty_for(a));
        for &pin in &self.pins {
            hw.set_duty(pin, duty)?;
        }
        self.holding = angle.map(|_| cmd);
        Ok(match angle {
            Some(a) => summary(format_args!("{} deg", a)),
            None => summary(format_args!("no signal")),
        })
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        for &pin in &self.pins {
            if let Err(e) = hw.set_duty(pin, 0) {
                warn!("Servo: GPIO{} stop on close failed: {}", pin, e);
            }
        }
        release_all(hw, self.pins.iter().copied());
    }
}
