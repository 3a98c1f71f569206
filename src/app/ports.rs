//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (GPIO, timers, clock, storage, event sinks) implement
//! these traits.  The [`AppService`](super::service::AppService) consumes
//! them via generics, so the domain core never touches hardware directly.
//!
//! ## Contract notes
//!
//! - **GpioPort** readback reports the output latch, not the pad.
//! - **TimerPort** callbacks never run domain code; they only enqueue
//!   [`Event`](crate::events::Event)s for the main loop.
//! - **ConfigPort** implementations MUST validate before persisting.

use crate::config::SystemConfig;
use crate::device::DeviceId;
use crate::error::HalError;
use crate::pins::Pin;
use crate::safety::Generation;

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

// ───────────────────────────────────────────────────────────────
// GPIO / PWM / pixel port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Per-pin digital, PWM and addressable-LED output.
pub trait GpioPort {
    /// Claim `pin` as a push-pull output and drive it to `high`.
    fn configure_output(&mut self, pin: Pin, high: bool) -> Result<(), HalError>;

    /// Drive a configured output.
    fn write(&mut self, pin: Pin, high: bool) -> Result<(), HalError>;

    /// Read back the output latch of a configured output.
    fn read(&self, pin: Pin) -> bool;

    /// Claim `pin` as a PWM output at `freq_hz` with zero duty.
    fn configure_pwm(&mut self, pin: Pin, freq_hz: u32) -> Result<(), HalError>;

    /// Set PWM duty on a 16-bit scale (`0` = no signal, `u16::MAX` = 100 %).
    fn set_duty(&mut self, pin: Pin, duty: u16) -> Result<(), HalError>;

    /// Claim `pin` as the data line of a WS2812 strip of `count` pixels.
    fn configure_pixels(&mut self, pin: Pin, count: u16) -> Result<(), HalError>;

    /// Transmit a full frame to the strip on `pin`.
    fn write_pixels(&mut self, pin: Pin, frame: &[Rgb]) -> Result<(), HalError>;

    /// Return the pin to its reset state and free any channel behind it.
    fn release(&mut self, pin: Pin);
}

// ───────────────────────────────────────────────────────────────
// Timer port (driven adapter: domain → hardware timers)
// ───────────────────────────────────────────────────────────────

/// The single shared periodic timer plus per-device one-shots.
pub trait TimerPort {
    /// (Re)start the periodic multiplex timer.  Must only be called disarmed.
    fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError>;

    /// Stop the periodic timer.  No-op when already stopped.
    fn disarm_periodic(&mut self);

    /// Arm a one-shot that delivers `SafetyTimeout(id, generation)` after
    /// `delay_ms`, replacing any pending one for `id`.
    fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError>;

    /// Cancel a pending one-shot.  No-op when none is pending.
    fn cancel_oneshot(&mut self, id: DeviceId);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time and the short blocking sleeps effectors need.
pub trait ClockPort {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Everything a device needs from the board, as one object-safe bound.
pub trait Hardware: GpioPort + TimerPort + ClockPort {}

impl<T: GpioPort + TimerPort + ClockPort + ?Sized> Hardware for T {}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent namespaced blob storage for profiles and the favourite pointer.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic, with no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Every key in `namespace`, in no particular order.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Connectivity port
// ───────────────────────────────────────────────────────────────

/// Network status.  Device initialisation waits for a connection so the
/// operator can observe the boot sequence over HTTP.
pub trait ConnectivityPort {
    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full, or the blob exceeds the size limit.
    Full,
    /// Generic I/O error.
    IoError,
    /// Namespace or key is not representable by the backend.
    InvalidKey,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidKey => write!(f, "invalid key"),
        }
    }
}
