//! Railyard accessory controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod pin_pool;
pub mod pins;
pub mod profile;
pub mod registry;
pub mod safety;
pub mod scheduler;

// The hardware-facing modules build on every target; the register access
// inside them is cfg-gated.
pub mod adapters;
pub mod drivers;

#[cfg(test)]
pub(crate) mod testing;
