//! On/off outputs and the safety-interlocked track disconnect.

use log::{error, warn};

use super::{
    ActionContext, BuildContext, Command, DeviceId, Driver, EffectSummary, Lines, claim_lines, release_all,
    set_lines, summary,
};
use crate::app::ports::Hardware;
use crate::error::DeviceError;

// ───────────────────────────────────────────────────────────────
// Plain on/off (OnOff, Unloader and their Double / Inverted kinds)
// ───────────────────────────────────────────────────────────────

/// One line, or two ganged lines that always move together.
#[derive(Debug)]
pub struct Switch {
    lines: Lines,
}

pub(crate) fn build_onoff(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    Ok(Driver::Switch(Switch {
        lines: claim_lines(ctx.hw, ctx.pins, false)?,
    }))
}

pub(crate) fn build_onoff_inverted(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    Ok(Driver::Switch(Switch {
        lines: claim_lines(ctx.hw, ctx.pins, true)?,
    }))
}

impl Switch {
    pub fn apply(&mut self, hw: &mut dyn Hardware, cmd: Command) -> Result<EffectSummary, DeviceError> {
        let energize = cmd == Command::On;
        set_lines(hw, &self.lines, energize)?;
        Ok(summary(format_args!("{}", if energize { "energized" } else { "de-energized" })))
    }

    pub fn close(&mut self, hw: &mut dyn Hardware) {
        if let Err(e) = set_lines(hw, &self.lines, false) {
            warn!("Switch: de-energize on close failed: {}", e);
        }
        release_all(hw, self.lines.iter().map(|l| l.pin));
    }
}

// ───────────────────────────────────────────────────────────────
// Disconnect
// ───────────────────────────────────────────────────────────────

/// Track-power relay that is never left energized unattended.
///
/// While energized a one-shot is always outstanding for this device and
/// the periodic multiplexer is held, so nothing else competes with the
/// expiry.  `holding` records that this device owns one hold.
#[derive(Debug)]
pub struct Disconnect {
    lines: Lines,
    shutdown_ms: u32,
    holding: bool,
}

fn build_disconnect_with(ctx: &mut BuildContext<'_>, active_high: bool) -> Result<Driver, DeviceError> {
    Ok(Driver::Disconnect(Disconnect {
        lines: claim_lines(ctx.hw, ctx.pins, active_high)?,
        shutdown_ms: ctx.config.safe_shutdown_secs.saturating_mul(1000),
        holding: false,
    }))
}

pub(crate) fn build_disconnect(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build_disconnect_with(ctx, false)
}

pub(crate) fn build_disconnect_inverted(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    build_disconnect_with(ctx, true)
}

impl Disconnect {
    #[cfg(test)]
    pub(crate) fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn apply(
        &mut self,
        ctx: &mut ActionContext<'_>,
        id: DeviceId,
        cmd: Command,
    ) -> Result<EffectSummary, DeviceError> {
        match cmd {
            Command::On => self.energize(ctx, id),
            Command::Off | Command::Neutral => {
                // Keep the one-shot if the line could not be dropped.
                set_lines(ctx.hw, &self.lines, false)?;
                ctx.interlock.cancel(ctx.hw, id);
                self.release_hold(ctx);
                Ok(summary(format_args!("de-energized")))
            }
        }
    }

    /// Hold the multiplexer, arm the one-shot, then energize.  The timer
    /// is armed first so the line is never on without it.
    fn energize(&mut self, ctx: &mut ActionContext<'_>, id: DeviceId) -> Result<EffectSummary, DeviceError> {
        if !self.holding {
            ctx.multiplexer.suspend(ctx.hw);
            self.holding = true;
        }
        if let Err(e) = ctx.interlock.arm(ctx.hw, id, self.shutdown_ms) {
            self.release_hold(ctx);
            return Err(e.into());
        }
        if let Err(e) = set_lines(ctx.hw, &self.lines, true) {
            // Partially energized is still energized: only drop the
            // one-shot once every line reads off again.
            if set_lines(ctx.hw, &self.lines, false).is_ok() {
                ctx.interlock.cancel(ctx.hw, id);
                self.release_hold(ctx);
            }
            return Err(e.into());
        }
        Ok(summary(format_args!("energized for {}ms", self.shutdown_ms)))
    }

    fn release_hold(&mut self, ctx: &mut ActionContext<'_>) {
        if self.holding {
            ctx.multiplexer.resume(ctx.hw);
            self.holding = false;
        }
    }

    /// The one-shot fired.  Returns `true` when the line had to be forced
    /// off.
    pub fn expire(&mut self, ctx: &mut ActionContext<'_>, id: DeviceId) -> Result<bool, DeviceError> {
        let energized = self.lines.iter().any(|l| l.is_energized(&*ctx.hw));
        if energized {
            if let Err(e) = set_lines(ctx.hw, &self.lines, false) {
                error!("Disconnect: GPIO{} safety shutdown failed: {}, retrying", self.lines[0].pin, e);
                ctx.interlock.arm(ctx.hw, id, self.shutdown_ms)?;
                return Err(e.into());
            }
            warn!("Disconnect: GPIO{} forced off after {}ms", self.lines[0].pin, self.shutdown_ms);
        }
        self.release_hold(ctx);
        Ok(energized)
    }

    pub fn close(&mut self, ctx: &mut ActionContext<'_>, id: DeviceId) {
        if let Err(e) = set_lines(ctx.hw, &self.lines, false) {
            error!("Disconnect: de-energize on close failed: {}", e);
        }
        ctx.interlock.cancel(ctx.hw, id);
        self.release_hold(ctx);
        release_all(ctx.hw, self.lines.iter().map(|l| l.pin));
    }
}
