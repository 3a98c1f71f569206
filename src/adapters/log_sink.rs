//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! An HTTP push or MQTT adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { devices, profile } => match profile {
                Some(name) => info!("START | {} devices from profile '{}'", devices, name),
                None => info!("START | {} devices from default layout", devices),
            },
            AppEvent::FallbackLayout(e) => {
                warn!("START | favourite not loaded ({}), default layout built", e);
            }
            AppEvent::DeviceCreated { pins, kind } => {
                info!("DEVICE | {} created as {}", pins, kind);
            }
            AppEvent::DeviceChanged { pins, from, to } => {
                info!("DEVICE | {} changed {} -> {}", pins, from, to);
            }
            AppEvent::DeviceRemoved { pins } => {
                info!("DEVICE | {} removed", pins);
            }
            AppEvent::StateChanged { pins, from, to } => {
                info!(
                    "STATE | {} {} -> {}",
                    pins,
                    from.unwrap_or("-"),
                    to.unwrap_or("-")
                );
            }
            AppEvent::SafetyShutdown { pins } => {
                warn!("SAFETY | {} forced off after timeout", pins);
            }
            AppEvent::ProfileSaved(name) => {
                info!("PROFILE | saved '{}'", name);
            }
            AppEvent::ProfileLoaded(name) => {
                info!("PROFILE | loaded '{}'", name);
            }
            AppEvent::ShutdownComplete => {
                info!("SHUTDOWN | all devices closed");
            }
            AppEvent::RestartScheduled { delay_secs } => {
                warn!("RESET | restarting in {} s", delay_secs);
            }
        }
    }
}
