//! Peripheral drivers behind the hardware adapter.

pub mod hw_init;
pub mod hw_timer;
pub mod pixels;
