//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the device registry and the profile store.  It is
//! constructed once in `main` and is the only thing that touches devices,
//! the pin pool or the timers; timer callbacks reach it as
//! [`Event`]s drained by the main loop.
//!
//! ```text
//!  HTTP layer ──AppCommand──▶ ┌─────────────────────────┐ ──▶ EventSink
//!                             │       AppService        │
//!  events queue ──Event─────▶ │ Registry · Profiles     │
//!                             └─────────────────────────┘
//!                                  │            │
//!                              Hardware     StoragePort
//! ```

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::device::{Device, DeviceId, kind};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::profile::ProfileStore;
use crate::registry::DeviceRegistry;
use crate::safety::Generation;

use super::commands::{AppCommand, Response};
use super::events::AppEvent;
use super::ports::{EventSink, Hardware, StoragePort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<S: StoragePort> {
    registry: DeviceRegistry,
    profiles: ProfileStore<S>,
    config: SystemConfig,
    initialized: bool,
    /// Uptime (ms) at which a requested restart is due.
    restart_at: Option<u64>,
}

impl<S: StoragePort> AppService<S> {
    /// Construct the service.  No hardware is touched until
    /// [`initialize`](Self::initialize).
    pub fn new(config: SystemConfig, storage: S) -> Self {
        Self {
            registry: DeviceRegistry::new(config.clone()),
            profiles: ProfileStore::new(storage),
            config,
            initialized: false,
            restart_at: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring the devices up.  Runs once; later calls are no-ops.
    pub fn initialize(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if self.initialized {
            return;
        }
        let profile = self.load_devices(hw, sink);
        self.initialized = true;
        sink.emit(&AppEvent::Started {
            devices: self.registry.len(),
            profile,
        });
        info!("AppService: started with {} devices", self.registry.len());
    }

    /// Load the favourite profile, or the factory layout when there is
    /// none or it fails.  Never fails; returns the loaded profile name.
    pub fn load_devices(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) -> Option<String> {
        let loaded: Result<Option<String>> = match self.profiles.load_favorite() {
            Ok(Some((name, records))) => match self.registry.load_records(hw, &records) {
                Ok(()) => Ok(Some(name)),
                Err(e) => Err(e.into()),
            },
            Ok(None) => Ok(None),
            Err(e) => Err(e.into()),
        };
        match loaded {
            Ok(Some(name)) => {
                info!("AppService: favourite profile '{}' loaded", name);
                sink.emit(&AppEvent::ProfileLoaded(name.clone()));
                Some(name)
            }
            Ok(None) => {
                self.registry.load_default_layout(hw);
                None
            }
            Err(e) => {
                warn!("AppService: could not load favourite profile: {}", e);
                self.registry.load_default_layout(hw);
                sink.emit(&AppEvent::FallbackLayout(e));
                None
            }
        }
    }

    /// Close every device.
    pub fn shutdown(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.registry.close_all(hw);
        sink.emit(&AppEvent::ShutdownComplete);
        info!("AppService: all devices closed");
    }

    /// Whether a requested restart is due at uptime `now_ms`.
    pub fn restart_due(&self, now_ms: u64) -> bool {
        self.restart_at.is_some_and(|at| now_ms >= at)
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_at.is_some()
    }

    // ── Timer events ──────────────────────────────────────────

    /// Dispatch one event drained from the timer queue.
    pub fn handle_event(&mut self, event: Event, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        match event {
            Event::MultiplexTick => self.registry.run_tick(hw),
            Event::SafetyTimeout(id, generation) => self.safety_timeout(id, generation, hw, sink),
        }
    }

    /// Force every safety arming whose expiry never reached the queue.
    /// Run once per main-loop pass, after draining the queue.
    pub fn enforce_safety_deadlines(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        for (id, generation) in self.registry.interlock().overdue(hw.now_ms()) {
            warn!("AppService: safety timeout for device {} never delivered, forcing it", id);
            self.safety_timeout(id, generation, hw, sink);
        }
    }

    fn safety_timeout(
        &mut self,
        id: DeviceId,
        generation: Generation,
        hw: &mut impl Hardware,
        sink: &mut impl EventSink,
    ) {
        let before = self.registry.find_by_id(id).map(Device::state);
        if let Err(e) = self.registry.on_safety_timeout(hw, id, generation) {
            // The interlock re-armed itself; the next expiry retries.
            error!("AppService: safety shutdown of device {} failed: {}", id, e);
            return;
        }
        if let Some(device) = self.registry.find_by_id(id) {
            if before != Some(device.state()) {
                sink.emit(&AppEvent::SafetyShutdown {
                    pins: device.pins().key(),
                });
            }
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process a request.  Failures are logged here and returned for the
    /// caller to turn into a failure status.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut impl Hardware,
        sink: &mut impl EventSink,
    ) -> Result<Response> {
        let label = format!("{:?}", cmd);
        self.dispatch(cmd, hw, sink).inspect_err(|e| {
            warn!("AppService: {} failed: {}", label, e);
        })
    }

    fn dispatch(&mut self, cmd: AppCommand, hw: &mut impl Hardware, sink: &mut impl EventSink) -> Result<Response> {
        match cmd {
            AppCommand::ListDevices => Ok(self.devices()),
            AppCommand::ListKinds(pin_count) => {
                let kinds = match pin_count {
                    Some(n) => kind::with_pin_count(n).map(|k| k.name).collect(),
                    None => kind::KINDS.iter().map(|k| k.name).collect(),
                };
                Ok(Response::Kinds { kinds })
            }
            AppCommand::AvailablePins => Ok(Response::Pins {
                pins: self.registry.available_pins(),
            }),

            AppCommand::CreateDevice { pins, kind, params } => {
                let device = self.registry.create(hw, pins, &kind, params.as_ref())?;
                sink.emit(&AppEvent::DeviceCreated {
                    pins: device.pins().key(),
                    kind: device.name(),
                });
                Ok(self.devices())
            }
            AppCommand::ChangeDevice { pins, kind } => {
                let from = self.registry.get(&pins.clone().into())?.name();
                let device = self.registry.change(hw, &pins, &kind)?;
                sink.emit(&AppEvent::DeviceChanged {
                    pins: pins.key(),
                    from,
                    to: device.name(),
                });
                Ok(Self::single(device))
            }
            AppCommand::RemoveDevice(pins) => {
                self.registry.remove(hw, &pins)?;
                sink.emit(&AppEvent::DeviceRemoved { pins: pins.key() });
                Ok(self.devices())
            }

            AppCommand::Toggle(addr) => {
                let from = self.registry.get(&addr)?.state();
                let device = self.registry.toggle(hw, &addr)?;
                Ok(Self::transition(device, from, sink))
            }
            AppCommand::On(addr) => {
                let from = self.registry.get(&addr)?.state();
                let device = self.registry.on(hw, &addr)?;
                Ok(Self::transition(device, from, sink))
            }
            AppCommand::Off(addr) => {
                let from = self.registry.get(&addr)?.state();
                let device = self.registry.off(hw, &addr)?;
                Ok(Self::transition(device, from, sink))
            }
            AppCommand::ResetDevice(addr) => {
                let from = self.registry.get(&addr)?.state();
                let device = self.registry.reset(hw, &addr)?;
                Ok(Self::transition(device, from, sink))
            }
            AppCommand::GetSteps(addr) => Ok(Response::Steps {
                steps: self.registry.steps(&addr)?,
            }),
            AppCommand::SetSteps(addr, steps) => Ok(Self::single(self.registry.set_steps(hw, &addr, steps)?)),

            AppCommand::ListProfiles => Ok(Response::Profiles(self.profiles.list()?)),
            AppCommand::SaveProfile(name) => {
                self.profiles.save(&name, &self.registry.records())?;
                sink.emit(&AppEvent::ProfileSaved(name.trim().into()));
                Ok(Response::Profiles(self.profiles.list()?))
            }
            AppCommand::LoadProfile(name) => {
                // Parse first: a bad profile leaves the devices alone.
                let records = self.profiles.load(&name)?;
                self.registry.load_records(hw, &records)?;
                sink.emit(&AppEvent::ProfileLoaded(name.trim().into()));
                Ok(self.devices())
            }
            AppCommand::RemoveProfile(name) => {
                self.profiles.remove(&name)?;
                Ok(Response::Profiles(self.profiles.list()?))
            }
            AppCommand::SetFavorite(name) => {
                self.profiles.set_favorite(&name)?;
                Ok(Response::Profiles(self.profiles.list()?))
            }
            AppCommand::ClearFavorite => {
                self.profiles.clear_favorite()?;
                Ok(Response::Profiles(self.profiles.list()?))
            }

            AppCommand::Shutdown => {
                self.shutdown(hw, sink);
                Ok(Response::Done)
            }
            AppCommand::Reset => {
                self.shutdown(hw, sink);
                let delay_secs = self.config.reset_wait_secs;
                self.restart_at = Some(hw.now_ms() + u64::from(delay_secs) * 1000);
                sink.emit(&AppEvent::RestartScheduled { delay_secs });
                Ok(Response::Restarting {
                    restart_in_secs: delay_secs,
                })
            }
        }
    }

    fn devices(&self) -> Response {
        Response::Devices {
            devices: self.registry.records(),
        }
    }

    fn single(device: &Device) -> Response {
        Response::Devices {
            devices: vec![device.record()],
        }
    }

    fn transition(device: &Device, from: Option<&'static str>, sink: &mut impl EventSink) -> Response {
        if device.state() != from {
            sink.emit(&AppEvent::StateChanged {
                pins: device.pins().key(),
                from,
                to: device.state(),
            });
        }
        Self::single(device)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
