//! Relay train switches.
//!
//! Two-coil point motors take a short pulse on one coil or the other;
//! a spur keeps one leg continuously energized so it also routes track
//! power; a single relay simply latches.  Relay boards are active-low
//! unless the kind is "Inverted".

use log::warn;

use super::{BuildContext, Command, Driver, EffectSummary, Line, Lines, claim_lines, release_all, set_lines, summary};
use crate::app::ports::Hardware;
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStyle {
    /// Pulse the straight or turn coil for `blink_ms`.
    Pulse,
    /// Hold one of the two legs energized.
    Spur,
    /// One latching line; neutral leaves it alone.
    Single,
}

#[derive(Debug)]
pub struct Relay {
    style: RelayStyle,
    lines: Lines,
    blink_ms: u32,
}

fn build(ctx: &mut BuildContext<'_>, style: RelayStyle, active_high: bool) -> Result<Driver, DeviceError> {
    let lines = claim_lines(ctx.hw, ctx.pins, active_high)?;
    Ok(Driver::Relay(Relay {
        style,
        lines,
        blink_ms: ctx.config.blink_ms,
    }))
}

pub(crate) fn build_pulse(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Pulse, false)
}

pub(crate) fn build_pulse_inverted(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Pulse, true)
}

pub(crate) fn build_spur(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Spur, false)
}

pub(crate) fn build_spur_inverted(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Spur, true)
}

pub(crate) fn build_single(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Single, false)
}

pub(crate) fn build_single_inverted(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build(ctx, RelayStyle::Single, true)
}

impl Relay {
    /// Straight coil is the lower pin, turn coil the upper.
    fn coils(&self) -> (Line, Line) {
        (self.lines[0], self.lines[self.lines.len() - 1])
    }

    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let (straight, turn) = self.coils();
        match (self.style, cmd) {
            (RelayStyle::Pulse, Command::On) => self.pulse(hw, straight),
            (RelayStyle::Pulse, Command::Off) => self.pulse(hw, turn),
            (RelayStyle::Spur, Command::On) => {
                turn.set(hw, false)?;
                straight.set(hw, true)?;
                Ok(summary(format_args!("GPIO{} held", straight.pin)))
            }
            (RelayStyle::Spur, Command::Off) => {
                straight.set(hw, false)?;
                turn.set(hw, true)?;
                Ok(summary(format_args!("GPIO{} held", turn.pin)))
            }
            (RelayStyle::Pulse | RelayStyle::Spur, Command::Neutral) => {
                set_lines(hw, &self.lines, false)?;
                Ok(summary(format_args!("released")))
            }
            (RelayStyle::Single, Command::On) => {
                straight.set(hw, true)?;
                Ok(summary(format_args!("GPIO{} on", straight.pin)))
            }
            (RelayStyle::Single, Command::Off) => {
                straight.set(hw, false)?;
                Ok(summary(format_args!("GPIO{} off", straight.pin)))
            }
            (RelayStyle::Single, Command::Neutral) => Ok(summary(format_args!("unchanged"))),
        }
    }

    fn pulse(&self, hw: &mut dyn Hardware, coil: Line) -> Result<EffectSummary, DeviceError> {
        coil.set(hw, false)?;
        coil.set(hw, true)?;
        hw.delay_ms(self.blink_ms);
        coil.set(hw, false)?;
        Ok(summary(format_args!("GPIO{} pulsed {}ms", coil.pin, self.blink_ms)))
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        if let Err(e) = set_lines(hw, &self.lines, false) {
            warn!("Relay: de-energize on close failed: {}", e);
        }
        release_all(hw, self.lines.iter().map(|l| l.pin));
    }
}
