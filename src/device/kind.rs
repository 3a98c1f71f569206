//! Static table of device kinds.
//!
//! Construction and introspection ("which kinds need two pins") both go
//! through [`KINDS`]; nothing is reflected at runtime.

use serde::Serialize;

use super::{BuildContext, Driver, light_beam, motor, relay, servo, switch};
use crate::error::DeviceError;

pub type BuildFn = fn(&mut BuildContext<'_>) -> Result<Driver, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    /// Latches the last successful command; repeats are skipped.
    Stateful,
    /// Momentary; every command runs.
    Stateless,
}

#[derive(Serialize)]
pub struct DeviceKind {
    pub name: &'static str,
    pub alias: &'static str,
    pub required_pins: usize,
    pub discipline: Discipline,
    pub on_state: Option<&'static str>,
    pub off_state: Option<&'static str>,
    #[serde(skip)]
    pub build: BuildFn,
}

impl core::fmt::Debug for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceKind")
            .field("name", &self.name)
            .field("required_pins", &self.required_pins)
            .field("discipline", &self.discipline)
            .finish_non_exhaustive()
    }
}

const STRAIGHT: Option<&str> = Some("straight");
const TURN: Option<&str> = Some("turn");
const ON: Option<&str> = Some("on");
const OFF: Option<&str> = Some("off");
const NEXT: Option<&str> = Some("next");
const LAST: Option<&str> = Some("last");

const fn kind(
    name: &'static str,
    alias: &'static str,
    required_pins: usize,
    discipline: Discipline,
    labels: (Option<&'static str>, Option<&'static str>),
    build: BuildFn,
) -> DeviceKind {
    DeviceKind {
        name,
        alias,
        required_pins,
        discipline,
        on_state: labels.0,
        off_state: labels.1,
        build,
    }
}

use Discipline::{Stateful, Stateless};

pub static KINDS: &[DeviceKind] = &[
    kind("RelayTrainSwitch", "relay", 2, Stateful, (STRAIGHT, TURN), relay::build_pulse),
    kind("InvertedRelayTrainSwitch", "inverted_relay", 2, Stateful, (STRAIGHT, TURN), relay::build_pulse_inverted),
    kind("SpurTrainSwitch", "spur", 2, Stateful, (STRAIGHT, TURN), relay::build_spur),
    kind("InvertedSpurTrainSwitch", "inverted_spur", 2, Stateful, (STRAIGHT, TURN), relay::build_spur_inverted),
    kind("SingleRelayTrainSwitch", "single_relay", 1, Stateful, (STRAIGHT, TURN), relay::build_single),
    kind("InvertedSingleRelayTrainSwitch", "inverted_single_relay", 1, Stateful, (STRAIGHT, TURN), relay::build_single_inverted),
    kind("OnOff", "onoff", 1, Stateful, (ON, OFF), switch::build_onoff),
    kind("DoubleOnOff", "double_onoff", 2, Stateful, (ON, OFF), switch::build_onoff),
    kind("Disconnect", "disconnect", 1, Stateful, (ON, OFF), switch::build_disconnect),
    kind("DoubleDisconnect", "double_disconnect", 2, Stateful, (ON, OFF), switch::build_disconnect),
    kind("InvertedDisconnect", "inverted_disconnect", 1, Stateful, (ON, OFF), switch::build_disconnect_inverted),
    kind("Unloader", "unloader", 1, Stateful, (ON, OFF), switch::build_onoff),
    kind("DoubleUnloader", "double_unloader", 2, Stateful, (ON, OFF), switch::build_onoff),
    kind("InvertedUnloader", "inverted_unloader", 1, Stateful, (ON, OFF), switch::build_onoff_inverted),
    kind("ServoTrainSwitch", "servo", 1, Stateful, (STRAIGHT, TURN), servo::build),
    kind("DoubleServoTrainSwitch", "double_servo", 2, Stateful, (STRAIGHT, TURN), servo::build),
    kind("ContinuousServoMotor", "continuous_servo", 1, Stateless, (NEXT, LAST), motor::build_continuous_servo),
    kind("DoubleContinuousServoMotor", "double_continuous_servo", 2, Stateless, (NEXT, LAST), motor::build_continuous_servo),
    kind("DCMotor", "dc_motor", 2, Stateless, (NEXT, LAST), motor::build_dc_motor),
    kind("StepperMotor", "stepper", 2, Stateless, (NEXT, LAST), motor::build_stepper),
    kind("LightBeam", "light_beam", 1, Stateful, (ON, OFF), light_beam::build),
    kind("DoubleLightBeam", "double_light_beam", 2, Stateful, (ON, OFF), light_beam::build),
    kind("EmptySwitch", "empty", 2, Stateful, (None, None), build_empty),
];

fn build_empty(_: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    Ok(Driver::Empty)
}

/// Look a kind up by canonical name or alias.
pub fn resolve(name: &str) -> Result<&'static DeviceKind, DeviceError> {
    let name = name.trim();
    KINDS
        .iter()
        .find(|k| k.name == name || k.alias == name)
        .ok_or_else(|| DeviceError::UnknownKind(name.into()))
}

/// Kinds an operator can place on `pin_count` pins.
pub fn with_pin_count(pin_count: usize) -> impl Iterator<Item = &'static DeviceKind> {
    KINDS.iter().filter(move |k| k.required_pins == pin_count)
}
