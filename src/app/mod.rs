//! Application core: pure domain logic, zero I/O.
//!
//! This module wires the device registry, profiles and timer events into
//! one service.  All interaction with hardware and flash happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
