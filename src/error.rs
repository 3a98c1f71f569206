//! Unified error types for the Railyard firmware.
//!
//! Every request-level failure funnels into [`Error`], so the command
//! boundary in [`AppService`](crate::app::service::AppService) can log and
//! report it uniformly.  Hardware failures are `Copy` so drivers can hand
//! them around freely.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};
use crate::pins::Pin;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A device request was rejected or a device effector failed.
    Device(DeviceError),
    /// A profile could not be read, written, or parsed.
    Profile(ProfileError),
    /// Configuration is invalid or could not be persisted.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Profile(e) => write!(f, "profile: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

impl From<ProfileError> for Error {
    fn from(e: ProfileError) -> Self {
        Self::Profile(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<HalError> for Error {
    fn from(e: HalError) -> Self {
        Self::Device(DeviceError::Hardware(e))
    }
}

// ---------------------------------------------------------------------------
// Hardware abstraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// GPIO direction / pull configuration failed.
    PinConfigFailed(Pin),
    /// GPIO level write failed.
    GpioWriteFailed(Pin),
    /// PWM duty or frequency update failed.
    PwmWriteFailed(Pin),
    /// Addressable LED frame transmission failed.
    PixelWriteFailed(Pin),
    /// All PWM / RMT channels are in use.
    NoFreeChannel(Pin),
    /// Hardware timer could not be created or started.
    TimerFailed,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinConfigFailed(p) => write!(f, "GPIO{p} configuration failed"),
            Self::GpioWriteFailed(p) => write!(f, "GPIO{p} write failed"),
            Self::PwmWriteFailed(p) => write!(f, "GPIO{p} PWM write failed"),
            Self::PixelWriteFailed(p) => write!(f, "GPIO{p} pixel write failed"),
            Self::NoFreeChannel(p) => write!(f, "no free channel for GPIO{p}"),
            Self::TimerFailed => write!(f, "hardware timer failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Pin is already owned, duplicated in the request, or not on the board.
    PinUnavailable(Pin),
    /// Device kind needs a different number of pins than were supplied.
    InvalidPinCount { expected: usize, found: usize },
    /// `change` between kinds whose pin requirements disagree.
    PinCountMismatch { expected: usize, found: usize },
    /// Device kind name is not in the kind table.
    UnknownKind(String),
    /// Command is not one of the device's state labels (or neutral).
    InvalidCommand(String),
    /// A construction or tuning parameter is out of range.
    InvalidParameter(&'static str),
    /// No device at the requested pins or index.
    DeviceNotFound(String),
    /// An effector failed at the hardware layer.
    Hardware(HalError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinUnavailable(p) => write!(f, "pin {p} is not available"),
            Self::InvalidPinCount { expected, found } => {
                write!(f, "expected {expected} pin(s), found {found}")
            }
            Self::PinCountMismatch { expected, found } => {
                write!(f, "pin amounts do not match: expected {expected}, found {found}")
            }
            Self::UnknownKind(name) => write!(f, "unknown device kind '{name}'"),
            Self::InvalidCommand(cmd) => write!(f, "invalid command '{cmd}'"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::DeviceNotFound(addr) => write!(f, "no device at {addr}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

impl From<HalError> for DeviceError {
    fn from(e: HalError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile stored under this name.
    NotFound(String),
    /// Underlying storage failed.
    Io(StorageError),
    /// Stored document is not a valid profile.
    Malformed(&'static str),
    /// The name collides with the favourite pointer.
    ProtectedName,
    /// Empty, too long, or contains unsupported characters.
    InvalidName,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "profile '{name}' not found"),
            Self::Io(e) => write!(f, "storage: {e}"),
            Self::Malformed(msg) => write!(f, "malformed profile: {msg}"),
            Self::ProtectedName => write!(f, "name is reserved, please use another"),
            Self::InvalidName => write!(f, "invalid profile name"),
        }
    }
}

impl From<StorageError> for ProfileError {
    fn from(e: StorageError) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
