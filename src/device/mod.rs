//! Device state-machine family.
//!
//! A [`Device`] is a kind from the static [`KINDS`] table plus a
//! [`Driver`] holding the peripheral lines it claimed at construction.
//! Two action disciplines sit on top of every driver:
//!
//! - **Stateful**: a command equal to the latched state is skipped;
//!   otherwise the effector runs and the state is latched only after it
//!   succeeds.
//! - **Stateless**: the effector always runs and `state` stays `None`.
//!
//! Drivers never see the registry.  Whatever they need beyond their own
//! lines (the board, the periodic multiplexer, the one-shot interlock)
//! arrives in an [`ActionContext`].

pub mod kind;
mod light_beam;
mod motor;
mod pinset;
mod relay;
mod servo;
mod switch;

use core::fmt::{self, Write as _};

use log::{Level, log};
use serde::{Deserialize, Serialize};

use crate::app::ports::Hardware;
use crate::config::SystemConfig;
use crate::error::{DeviceError, HalError};
use crate::pins::Pin;
use crate::safety::SafetyInterlock;
use crate::scheduler::TimerMultiplexer;

pub use kind::{DeviceKind, Discipline, KINDS};
pub use light_beam::{Beam, BeamParams};
pub use pinset::{MAX_DEVICE_PINS, PinKey, PinSet};

/// Registration handle, unique for the life of the process.  Timer
/// callbacks carry this instead of a reference to the device.
pub type DeviceId = u16;

/// Short human-readable result of one effector run, for the log.
pub type EffectSummary = heapless::String<32>;

pub(crate) fn summary(args: fmt::Arguments<'_>) -> EffectSummary {
    let mut s = EffectSummary::new();
    // Truncation only shortens a log line.
    let _ = s.write_fmt(args);
    s
}

// ───────────────────────────────────────────────────────────────
// Commands
// ───────────────────────────────────────────────────────────────

/// A command resolved against a kind's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
    /// Deactivate / uncontrolled.  Always legal.
    Neutral,
}

// ───────────────────────────────────────────────────────────────
// Contexts
// ───────────────────────────────────────────────────────────────

/// What an effector may touch besides its own lines.
pub struct ActionContext<'a> {
    pub hw: &'a mut dyn Hardware,
    pub multiplexer: &'a mut TimerMultiplexer,
    pub interlock: &'a mut SafetyInterlock,
}

/// Inputs to a kind's constructor.
pub struct BuildContext<'a> {
    pub hw: &'a mut dyn Hardware,
    pub pins: &'a PinSet,
    pub config: &'a SystemConfig,
    pub params: Option<&'a BeamParams>,
}

// ───────────────────────────────────────────────────────────────
// Output lines
// ───────────────────────────────────────────────────────────────

/// One digital output with its polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line {
    pub pin: Pin,
    pub active_high: bool,
}

pub(crate) type Lines = heapless::Vec<Line, MAX_DEVICE_PINS>;

impl Line {
    pub fn set(self, hw: &mut dyn Hardware, energized: bool) -> Result<(), HalError> {
        hw.write(self.pin, energized == self.active_high)
    }

    pub fn is_energized(self, hw: &dyn Hardware) -> bool {
        hw.read(self.pin) == self.active_high
    }
}

/// Configure every pin as a de-energized output.  On failure the lines
/// already configured are released again.
pub(crate) fn claim_lines(
    hw: &mut dyn Hardware,
    pins: &PinSet,
    active_high: bool,
) -> Result<Lines, DeviceError> {
    let mut lines = Lines::new();
    for &pin in pins.iter() {
        if let Err(e) = hw.configure_output(pin, !active_high) {
            release_all(hw, lines.iter().map(|l| l.pin));
            return Err(e.into());
        }
        // PinSet never holds more than MAX_DEVICE_PINS.
        let _ = lines.push(Line { pin, active_high });
    }
    Ok(lines)
}

/// Configure every pin as a PWM output at `freq_hz`, zero duty.
pub(crate) fn claim_pwm(
    hw: &mut dyn Hardware,
    pins: &PinSet,
    freq_hz: u32,
) -> Result<heapless::Vec<Pin, MAX_DEVICE_PINS>, DeviceError> {
    let mut claimed = heapless::Vec::new();
    for &pin in pins.iter() {
        if let Err(e) = hw.configure_pwm(pin, freq_hz) {
            release_all(hw, claimed.iter().copied());
            return Err(e.into());
        }
        let _ = claimed.push(pin);
    }
    Ok(claimed)
}

pub(crate) fn release_all(hw: &mut dyn Hardware, pins: impl Iterator<Item = Pin>) {
    for pin in pins {
        hw.release(pin);
    }
}

/// Drive every line, attempting all of them even after a failure.
pub(crate) fn set_lines(hw: &mut dyn Hardware, lines: &[Line], energized: bool) -> Result<(), HalError> {
    let mut first_err = None;
    for line in lines {
        if let Err(e) = line.set(hw, energized) {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

// ───────────────────────────────────────────────────────────────
// Drivers
// ───────────────────────────────────────────────────────────────

/// Hardware behaviour of one device.  Closed set; dispatch is a match.
pub enum Driver {
    Relay(relay::Relay),
    Switch(switch::Switch),
    Disconnect(switch::Disconnect),
    Servo(servo::Servo),
    ContinuousServo(motor::ContinuousServo),
    DcMotor(motor::DcMotor),
    Stepper(motor::Stepper),
    LightBeam(light_beam::LightBeam),
    /// Placeholder holding two pins and no hardware.
    Empty,
}

impl Driver {
    fn apply(
        &mut self,
        ctx: &mut ActionContext<'_>,
        id: DeviceId,
        cmd: Command,
    ) -> Result<EffectSummary, DeviceError> {
        match self {
            Self::Relay(d) => d.apply(ctx.hw, cmd),
            Self::Switch(d) => d.apply(ctx.hw, cmd),
            Self::Disconnect(d) => d.apply(ctx, id, cmd),
            Self::Servo(d) => d.apply(ctx.hw, cmd),
            Self::ContinuousServo(d) => d.apply(ctx.hw, cmd),
            Self::DcMotor(d) => d.apply(ctx.hw, cmd),
            Self::Stepper(d) => d.apply(ctx.hw, cmd),
            Self::LightBeam(d) => d.apply(ctx, id, cmd),
            Self::Empty => Ok(summary(format_args!("none"))),
        }
    }

    fn close(&mut self, ctx: &mut ActionContext<'_>, id: DeviceId) {
        match self {
            Self::Relay(d) => d.close(ctx.hw),
            Self::Switch(d) => d.close(ctx.hw),
            Self::Disconnect(d) => d.close(ctx, id),
            Self::Servo(d) => d.close(ctx.hw),
            Self::ContinuousServo(d) => d.close(ctx.hw),
            Self::DcMotor(d) => d.close(ctx.hw),
            Self::Stepper(d) => d.close(ctx.hw),
            Self::LightBeam(d) => d.close(ctx, id),
            Self::Empty => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

pub struct Device {
    id: DeviceId,
    pins: PinSet,
    kind: &'static DeviceKind,
    state: Option<&'static str>,
    verbose: bool,
    driver: Driver,
    closed: bool,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("pins", &self.pins)
            .field("kind", &self.kind.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.kind.name, self.pins)
    }
}

impl Device {
    /// Construct `kind` on `pins`.  The caller owns the pins already.
    pub fn build(
        id: DeviceId,
        kind: &'static DeviceKind,
        pins: PinSet,
        params: Option<&BeamParams>,
        hw: &mut dyn Hardware,
        config: &SystemConfig,
    ) -> Result<Self, DeviceError> {
        if pins.len() != kind.required_pins {
            return Err(DeviceError::InvalidPinCount {
                expected: kind.required_pins,
                found: pins.len(),
            });
        }
        let driver = (kind.build)(&mut BuildContext {
            hw,
            pins: &pins,
            config,
            params,
        })?;
        Ok(Self {
            id,
            pins,
            kind,
            state: None,
            verbose: config.verbose,
            driver,
            closed: false,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn pins(&self) -> &PinSet {
        &self.pins
    }

    pub fn kind(&self) -> &'static DeviceKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name
    }

    pub fn state(&self) -> Option<&'static str> {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Map a wire command onto this kind's labels.
    pub fn parse_command(&self, cmd: Option<&str>) -> Result<Command, DeviceError> {
        match cmd {
            None => Ok(Command::Neutral),
            Some(c) if Some(c) == self.kind.on_state => Ok(Command::On),
            Some(c) if Some(c) == self.kind.off_state => Ok(Command::Off),
            Some(c) => Err(DeviceError::InvalidCommand(c.into())),
        }
    }

    fn label(&self, cmd: Command) -> Option<&'static str> {
        match cmd {
            Command::On => self.kind.on_state,
            Command::Off => self.kind.off_state,
            Command::Neutral => None,
        }
    }

    /// Run `cmd` under this kind's discipline.
    pub fn action(&mut self, ctx: &mut ActionContext<'_>, cmd: Option<&str>) -> Result<(), DeviceError> {
        let cmd = self.parse_command(cmd)?;
        self.apply(ctx, cmd)
    }

    pub fn apply(&mut self, ctx: &mut ActionContext<'_>, cmd: Command) -> Result<(), DeviceError> {
        let initial = self.state;
        let label = self.label(cmd);
        let stateful = self.kind.discipline == Discipline::Stateful;

        if stateful && label == initial {
            self.log(initial, label, "skipped");
            return Ok(());
        }
        if self.closed {
            return Err(DeviceError::DeviceNotFound(self.pins.key().as_str().into()));
        }

        let update = self.driver.apply(ctx, self.id, cmd)?;
        if stateful {
            self.state = label;
        }
        self.log(initial, label, &update);
        Ok(())
    }

    /// One multiplexer tick.  Only devices registered with the
    /// multiplexer do anything here.
    pub fn tick(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DeviceError> {
        match &mut self.driver {
            Driver::LightBeam(d) if !self.closed => d.run(ctx.hw),
            _ => Ok(()),
        }
    }

    /// The safety one-shot for this device fired.
    pub fn safety_timeout(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DeviceError> {
        let Driver::Disconnect(d) = &mut self.driver else {
            return Ok(());
        };
        if self.closed {
            return Ok(());
        }
        let initial = self.state;
        if d.expire(ctx, self.id)? {
            self.state = self.kind.off_state;
            self.log(initial, self.state, "safety shutdown");
        }
        Ok(())
    }

    /// Servo travel or stepper step count.
    pub fn steps(&self) -> Option<u32> {
        match &self.driver {
            Driver::Servo(d) => Some(d.steps()),
            Driver::Stepper(d) => Some(d.steps()),
            _ => None,
        }
    }

    pub fn set_steps(&mut self, hw: &mut dyn Hardware, steps: u32) -> Result<(), DeviceError> {
        match &mut self.driver {
            Driver::Servo(d) => d.set_steps(hw, steps),
            Driver::Stepper(d) => d.set_steps(steps),
            _ => Err(DeviceError::InvalidParameter("device has no steps")),
        }
    }

    pub fn beam_params(&self) -> Option<BeamParams> {
        match &self.driver {
            Driver::LightBeam(d) => Some(d.beam().into()),
            _ => None,
        }
    }

    /// Serializable snapshot.
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            pins: self.pins.clone(),
            state: self.state.map(Into::into),
            name: self.kind.name.into(),
            params: self.beam_params(),
            steps: self.steps(),
        }
    }

    /// Release every peripheral handle.  Idempotent.
    pub fn close(&mut self, ctx: &mut ActionContext<'_>) {
        if self.closed {
            return;
        }
        self.driver.close(ctx, self.id);
        self.closed = true;
        self.log(self.state, None, "closed");
    }

    fn log(&self, initial: Option<&str>, action: Option<&str>, update: &str) {
        let level = if self.verbose { Level::Info } else { Level::Debug };
        log!(
            level,
            "Device: {} initial={} action={} update={}",
            self,
            initial.unwrap_or("None"),
            action.unwrap_or("None"),
            update
        );
    }
}

// ───────────────────────────────────────────────────────────────
// Serialized form
// ───────────────────────────────────────────────────────────────

/// `{pins, state, name}` plus the tunables a profile restores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub pins: PinSet,
    pub state: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BeamParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}
