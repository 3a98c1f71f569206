//! Inbound commands to the application service.
//!
//! These represent requests from the outside world (the HTTP layer, the
//! boot sequence) that the [`AppService`](super::service::AppService)
//! interprets and answers with a [`Response`].

use serde::Serialize;

use crate::device::{BeamParams, DeviceRecord, PinSet};
use crate::pins::Pin;
use crate::profile::ProfileListing;
use crate::registry::DeviceAddress;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Snapshot of every device.
    ListDevices,
    /// Kind names, optionally only those placeable on `n` pins.
    ListKinds(Option<usize>),
    /// Pins not owned by any device.
    AvailablePins,

    CreateDevice {
        pins: PinSet,
        kind: String,
        params: Option<BeamParams>,
    },
    ChangeDevice { pins: PinSet, kind: String },
    RemoveDevice(PinSet),

    Toggle(DeviceAddress),
    On(DeviceAddress),
    Off(DeviceAddress),
    /// Send the neutral command (relays released, motors stopped).
    ResetDevice(DeviceAddress),
    GetSteps(DeviceAddress),
    SetSteps(DeviceAddress, u32),

    ListProfiles,
    SaveProfile(String),
    LoadProfile(String),
    RemoveProfile(String),
    SetFavorite(String),
    ClearFavorite,

    /// Close every device.
    Shutdown,
    /// Close every device and schedule a restart.
    Reset,
}

/// Answer to a successful command, serialized as the HTTP body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Devices { devices: Vec<DeviceRecord> },
    Profiles(ProfileListing),
    Kinds { kinds: Vec<&'static str> },
    Pins { pins: Vec<Pin> },
    Steps { steps: u32 },
    Restarting { restart_in_secs: u32 },
    Done,
}
