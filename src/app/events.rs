//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them.

use crate::device::PinKey;
use crate::error::Error;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Devices are up; `profile` names the favourite if it was loaded.
    Started {
        devices: usize,
        profile: Option<String>,
    },

    /// The favourite could not be loaded and the factory layout was built.
    FallbackLayout(Error),

    DeviceCreated { pins: PinKey, kind: &'static str },
    DeviceChanged {
        pins: PinKey,
        from: &'static str,
        to: &'static str,
    },
    DeviceRemoved { pins: PinKey },

    /// A device's latched state moved.
    StateChanged {
        pins: PinKey,
        from: Option<&'static str>,
        to: Option<&'static str>,
    },

    /// A safety one-shot forced a device off.
    SafetyShutdown { pins: PinKey },

    ProfileSaved(String),
    ProfileLoaded(String),

    /// Every device was closed.
    ShutdownComplete,

    /// A restart was requested and is due in `delay_secs`.
    RestartScheduled { delay_secs: u32 },
}
