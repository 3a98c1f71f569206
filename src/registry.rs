//! Device registry.
//!
//! Insertion-ordered devices keyed by their [`PinSet`], together with the
//! pin pool, the periodic multiplexer and the one-shot interlock.  Every
//! mutation goes through here so pool and devices always change in the
//! same step:
//!
//! ```text
//!   create ─▶ resolve kind ─▶ check pin count ─▶ pool.allocate ─▶ Device::build
//!                                                     ▲                │ Err
//!                                                     └── pool.release ◀┘
//! ```

use core::fmt;

use log::{debug, error, info, warn};

use crate::app::ports::Hardware;
use crate::config::SystemConfig;
use crate::device::{ActionContext, BeamParams, Device, DeviceId, DeviceRecord, PinSet, kind};
use crate::error::DeviceError;
use crate::pin_pool::PinPool;
use crate::pins::{DEFAULT_KIND, DEFAULT_LAYOUT, Pin};
use crate::safety::{Generation, SafetyInterlock};
use crate::scheduler::TimerMultiplexer;

/// How a request names a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    Pins(PinSet),
    /// 1-based position in insertion order.
    Index(usize),
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pins(pins) => write!(f, "{pins}"),
            Self::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<PinSet> for DeviceAddress {
    fn from(pins: PinSet) -> Self {
        Self::Pins(pins)
    }
}

pub struct DeviceRegistry {
    devices: Vec<Device>,
    pool: PinPool,
    multiplexer: TimerMultiplexer,
    interlock: SafetyInterlock,
    config: SystemConfig,
    next_id: DeviceId,
}

impl DeviceRegistry {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            devices: Vec::new(),
            pool: PinPool::new(config.pin_universe()),
            multiplexer: TimerMultiplexer::new(config.timer_buffer_ms),
            interlock: SafetyInterlock::new(),
            config,
            next_id: 0,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, addr: &DeviceAddress) -> Result<&Device, DeviceError> {
        self.position(addr).map(|i| &self.devices[i])
    }

    /// Free pins in ascending order.
    pub fn available_pins(&self) -> Vec<Pin> {
        self.pool.available()
    }

    pub fn pool(&self) -> &PinPool {
        &self.pool
    }

    pub fn multiplexer(&self) -> &TimerMultiplexer {
        &self.multiplexer
    }

    pub fn interlock(&self) -> &SafetyInterlock {
        &self.interlock
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Serializable snapshot of every device, in order.
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.devices.iter().map(Device::record).collect()
    }

    pub fn find_by_id(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    fn position(&self, addr: &DeviceAddress) -> Result<usize, DeviceError> {
        let found = match addr {
            DeviceAddress::Pins(pins) => self.devices.iter().position(|d| d.pins() == pins),
            DeviceAddress::Index(i) => i.checked_sub(1).filter(|&i| i < self.devices.len()),
        };
        found.ok_or_else(|| DeviceError::DeviceNotFound(addr.to_string()))
    }

    fn allocate_id(&mut self) -> DeviceId {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if self.devices.iter().all(|d| d.id() != id) {
                return id;
            }
        }
    }

    // ── Construction ──────────────────────────────────────────

    /// Add a `kind` device on `pins`.  Checks run in a fixed order: kind
    /// name, pin count, pin availability.
    pub fn create(
        &mut self,
        hw: &mut dyn Hardware,
        pins: PinSet,
        kind_name: &str,
        params: Option<&BeamParams>,
    ) -> Result<&Device, DeviceError> {
        let kind = kind::resolve(kind_name)?;
        if pins.len() != kind.required_pins {
            return Err(DeviceError::InvalidPinCount {
                expected: kind.required_pins,
                found: pins.len(),
            });
        }
        self.pool.allocate(&pins)?;

        let id = self.allocate_id();
        match Device::build(id, kind, pins.clone(), params, hw, &self.config) {
            Ok(device) => {
                info!("Registry: created {} (id {})", device, id);
                self.devices.push(device);
                Ok(&self.devices[self.devices.len() - 1])
            }
            Err(e) => {
                self.pool.release(&pins);
                warn!("Registry: building {} on {} failed: {}", kind.name, pins, e);
                Err(e)
            }
        }
    }

    /// Replace the device on `pins` with a `kind_name` device.  The pins
    /// stay allocated and the position is kept.  If the new device cannot
    /// be built the old kind is rebuilt uncontrolled.
    pub fn change(&mut self, hw: &mut dyn Hardware, pins: &PinSet, kind_name: &str) -> Result<&Device, DeviceError> {
        let new_kind = kind::resolve(kind_name)?;
        let idx = self.position(&DeviceAddress::Pins(pins.clone()))?;
        let old_kind = self.devices[idx].kind();

        if pins.len() != new_kind.required_pins {
            return Err(DeviceError::PinCountMismatch {
                expected: new_kind.required_pins,
                found: pins.len(),
            });
        }
        if old_kind.required_pins != new_kind.required_pins {
            return Err(DeviceError::PinCountMismatch {
                expected: old_kind.required_pins,
                found: new_kind.required_pins,
            });
        }

        let old_params = self.devices[idx].beam_params();
        self.devices[idx].close(&mut ActionContext {
            hw: &mut *hw,
            multiplexer: &mut self.multiplexer,
            interlock: &mut self.interlock,
        });

        let id = self.allocate_id();
        match Device::build(id, new_kind, pins.clone(), None, &mut *hw, &self.config) {
            Ok(device) => {
                info!("Registry: {} changed from {} to {}", pins, old_kind.name, new_kind.name);
                self.devices[idx] = device;
                Ok(&self.devices[idx])
            }
            Err(e) => {
                warn!("Registry: changing {} to {} failed: {}", pins, new_kind.name, e);
                let id = self.allocate_id();
                match Device::build(id, old_kind, pins.clone(), old_params.as_ref(), hw, &self.config) {
                    Ok(device) => self.devices[idx] = device,
                    Err(e2) => {
                        error!("Registry: restoring {} on {} failed: {}, dropping it", old_kind.name, pins, e2);
                        self.devices.remove(idx);
                        self.pool.release(pins);
                    }
                }
                Err(e)
            }
        }
    }

    /// Close the device on `pins` and return its pins to the pool.
    pub fn remove(&mut self, hw: &mut dyn Hardware, pins: &PinSet) -> Result<(), DeviceError> {
        let idx = self.position(&DeviceAddress::Pins(pins.clone()))?;
        let mut device = self.devices.remove(idx);
        device.close(&mut ActionContext {
            hw,
            multiplexer: &mut self.multiplexer,
            interlock: &mut self.interlock,
        });
        self.pool.release(device.pins());
        info!("Registry: removed {}", device);
        Ok(())
    }

    /// Close every device, empty the registry and free every pin.
    pub fn close_all(&mut self, hw: &mut dyn Hardware) {
        for device in &mut self.devices {
            device.close(&mut ActionContext {
                hw: &mut *hw,
                multiplexer: &mut self.multiplexer,
                interlock: &mut self.interlock,
            });
        }
        let closed = self.devices.len();
        self.devices.clear();
        self.multiplexer.clear(hw);
        self.pool.reset();
        if closed > 0 {
            info!("Registry: closed {} devices", closed);
        }
    }

    // ── Actions ───────────────────────────────────────────────

    /// Run a raw wire command (`None` = reset) on the addressed device.
    pub fn action(
        &mut self,
        hw: &mut dyn Hardware,
        addr: &DeviceAddress,
        cmd: Option<&str>,
    ) -> Result<&Device, DeviceError> {
        let idx = self.position(addr)?;
        self.devices[idx].action(
            &mut ActionContext {
                hw,
                multiplexer: &mut self.multiplexer,
                interlock: &mut self.interlock,
            },
            cmd,
        )?;
        Ok(&self.devices[idx])
    }

    /// `off` if the device is currently on, `on` otherwise.
    pub fn toggle(&mut self, hw: &mut dyn Hardware, addr: &DeviceAddress) -> Result<&Device, DeviceError> {
        let device = self.get(addr)?;
        let kind = device.kind();
        let label = if device.state().is_some() && device.state() == kind.on_state {
            kind.off_state
        } else {
            kind.on_state
        };
        self.action(hw, addr, label)
    }

    pub fn on(&mut self, hw: &mut dyn Hardware, addr: &DeviceAddress) -> Result<&Device, DeviceError> {
        let label = self.get(addr)?.kind().on_state;
        self.action(hw, addr, label)
    }

    pub fn off(&mut self, hw: &mut dyn Hardware, addr: &DeviceAddress) -> Result<&Device, DeviceError> {
        let label = self.get(addr)?.kind().off_state;
        self.action(hw, addr, label)
    }

    pub fn reset(&mut self, hw: &mut dyn Hardware, addr: &DeviceAddress) -> Result<&Device, DeviceError> {
        self.action(hw, addr, None)
    }

    pub fn steps(&self, addr: &DeviceAddress) -> Result<u32, DeviceError> {
        self.get(addr)?
            .steps()
            .ok_or(DeviceError::InvalidParameter("device has no steps"))
    }

    pub fn set_steps(&mut self, hw: &mut dyn Hardware, addr: &DeviceAddress, steps: u32) -> Result<&Device, DeviceError> {
        let idx = self.position(addr)?;
        self.devices[idx].set_steps(hw, steps)?;
        debug!("Registry: {} steps set to {}", self.devices[idx], steps);
        Ok(&self.devices[idx])
    }

    // ── Timer events ──────────────────────────────────────────

    /// Service one multiplexer tick: every registered device in order.
    /// Device failures are logged and do not stop the tick.
    pub fn run_tick(&mut self, hw: &mut dyn Hardware) {
        let started = hw.now_ms();
        for id in self.multiplexer.ids() {
            let Some(device) = self.devices.iter_mut().find(|d| d.id() == id) else {
                warn!("Registry: tick for unknown device {}", id);
                continue;
            };
            if let Err(e) = device.tick(&mut ActionContext {
                hw: &mut *hw,
                multiplexer: &mut self.multiplexer,
                interlock: &mut self.interlock,
            }) {
                warn!("Registry: {} tick failed: {}", device, e);
            }
        }
        let elapsed = hw.now_ms().saturating_sub(started);
        self.multiplexer.record_tick(elapsed);
    }

    /// The one-shot for `id` fired.  Expiries of a cancelled or replaced
    /// arming are ignored.
    pub fn on_safety_timeout(
        &mut self,
        hw: &mut dyn Hardware,
        id: DeviceId,
        generation: Generation,
    ) -> Result<(), DeviceError> {
        if !self.interlock.take_expired(id, generation) {
            debug!("Registry: stale safety timeout for {} (gen {})", id, generation);
            return Ok(());
        }
        let Some(device) = self.devices.iter_mut().find(|d| d.id() == id) else {
            return Ok(());
        };
        device.safety_timeout(&mut ActionContext {
            hw,
            multiplexer: &mut self.multiplexer,
            interlock: &mut self.interlock,
        })
    }

    // ── Bulk loading ──────────────────────────────────────────

    /// Replace every device with `records`: build all of them in order,
    /// then apply the saved states.  On failure the registry is left empty
    /// with every pin free.
    pub fn load_records(&mut self, hw: &mut dyn Hardware, records: &[DeviceRecord]) -> Result<(), DeviceError> {
        self.close_all(hw);
        if let Err(e) = self.restore(hw, records) {
            error!("Registry: restore failed: {}", e);
            self.close_all(hw);
            return Err(e);
        }
        info!("Registry: restored {} devices", self.devices.len());
        Ok(())
    }

    fn restore(&mut self, hw: &mut dyn Hardware, records: &[DeviceRecord]) -> Result<(), DeviceError> {
        for record in records {
            self.create(hw, record.pins.clone(), &record.name, record.params.as_ref())?;
            if let Some(steps) = record.steps {
                self.set_steps(hw, &DeviceAddress::Pins(record.pins.clone()), steps)?;
            }
        }
        for (device, record) in self.devices.iter_mut().zip(records) {
            device.action(
                &mut ActionContext {
                    hw: &mut *hw,
                    multiplexer: &mut self.multiplexer,
                    interlock: &mut self.interlock,
                },
                record.state.as_deref(),
            )?;
        }
        Ok(())
    }

    /// Replace every device with the factory layout.
    pub fn load_default_layout(&mut self, hw: &mut dyn Hardware) {
        self.close_all(hw);
        for pair in DEFAULT_LAYOUT {
            let created = PinSet::new(&pair).and_then(|pins| self.create(hw, pins, DEFAULT_KIND, None).map(|_| ()));
            if let Err(e) = created {
                warn!("Registry: default device on {:?} skipped: {}", pair, e);
            }
        }
        info!("Registry: default layout with {} devices", self.devices.len());
    }
}
