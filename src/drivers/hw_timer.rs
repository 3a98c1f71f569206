//! Hardware timers using ESP-IDF's esp_timer API.
//!
//! One periodic timer drives the multiplexer; each device that needs a
//! safety window gets its own one-shot.  Callbacks execute in the
//! esp_timer task context (not ISR) and only push an
//! [`Event`] into the lock-free queue.  A one-shot's
//! callback argument packs the device id and the arming generation, so
//! nothing is captured.  Should the queue be full, the expiry is not
//! retried here: the interlock's overdue sweep in the main loop forces
//! the device off shortly after the deadline.
//!
//! On simulation targets the timers are deadlines checked by
//! [`HwTimers::poll`].

use std::collections::BTreeMap;

use log::debug;

use crate::device::DeviceId;
use crate::error::HalError;
use crate::events::Event;
use crate::safety::Generation;

/// One-shot callback argument: generation above the 16-bit device id.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn pack_oneshot_arg(id: DeviceId, generation: Generation) -> usize {
    (usize::from(generation) << 16) | usize::from(id)
}

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn unpack_oneshot_arg(arg: usize) -> (DeviceId, Generation) {
    ((arg & 0xFFFF) as DeviceId, ((arg >> 16) & 0xFF) as Generation)
}

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use crate::events::push_event;

#[cfg(target_os = "espidf")]
unsafe extern "C" fn multiplex_tick_cb(_arg: *mut core::ffi::c_void) {
    if !push_event(Event::MultiplexTick) {
        log::warn!("hw_timer: event queue full, tick dropped");
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn safety_timeout_cb(arg: *mut core::ffi::c_void) {
    let (id, generation) = unpack_oneshot_arg(arg as usize);
    if !push_event(Event::SafetyTimeout(id, generation)) {
        log::error!(
            "hw_timer: event queue full, timeout for #{} left to the overdue sweep",
            id
        );
    }
}

#[cfg(target_os = "espidf")]
fn create_timer(
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    arg: usize,
    name: &'static [u8],
) -> Result<esp_timer_handle_t, HalError> {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg: arg as *mut _,
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr() as *const _,
        skip_unhandled_events: true,
    };
    let mut handle: esp_timer_handle_t = core::ptr::null_mut();
    // SAFETY: args outlive the call; the handle is owned by HwTimers.
    let ret = unsafe { esp_timer_create(&args, &mut handle) };
    if ret != ESP_OK {
        log::error!("hw_timer: create failed (rc={})", ret);
        return Err(HalError::TimerFailed);
    }
    Ok(handle)
}

/// The multiplex timer plus per-device one-shots.
#[cfg(target_os = "espidf")]
pub struct HwTimers {
    periodic: esp_timer_handle_t,
    /// One handle per armed device.  The callback argument is fixed at
    /// creation, so every arming gets a fresh handle.
    oneshots: BTreeMap<DeviceId, esp_timer_handle_t>,
}

#[cfg(target_os = "espidf")]
impl HwTimers {
    pub fn new() -> Result<Self, HalError> {
        let periodic = create_timer(multiplex_tick_cb, 0, b"multiplex\0")?;
        log::info!("hw_timer: multiplex timer created");
        Ok(Self {
            periodic,
            oneshots: BTreeMap::new(),
        })
    }

    pub fn arm_periodic(&mut self, period_ms: u32) -> Result<(), HalError> {
        // SAFETY: handle created in new() and never deleted while self lives.
        let ret = unsafe { esp_timer_start_periodic(self.periodic, u64::from(period_ms) * 1_000) };
        if ret != ESP_OK {
            return Err(HalError::TimerFailed);
        }
        debug!("hw_timer: multiplex every {} ms", period_ms);
        Ok(())
    }

    pub fn disarm_periodic(&mut self) {
        // SAFETY: stopping an idle timer returns ESP_ERR_INVALID_STATE only.
        unsafe {
            esp_timer_stop(self.periodic);
        }
    }

    pub fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32) -> Result<(), HalError> {
        self.cancel_oneshot(id);
        let handle = create_timer(safety_timeout_cb, pack_oneshot_arg(id, generation), b"safety\0")?;
        // SAFETY: handle was just created and is owned by self below.
        let ret = unsafe { esp_timer_start_once(handle, u64::from(delay_ms) * 1_000) };
        if ret != ESP_OK {
            // SAFETY: never started, never stored.
            unsafe {
                esp_timer_delete(handle);
            }
            return Err(HalError::TimerFailed);
        }
        self.oneshots.insert(id, handle);
        debug!("hw_timer: one-shot #{} gen {} in {} ms", id, generation, delay_ms);
        Ok(())
    }

    pub fn cancel_oneshot(&mut self, id: DeviceId) {
        if let Some(handle) = self.oneshots.remove(&id) {
            // SAFETY: the handle leaves the map here, so nothing reuses it.
            unsafe {
                esp_timer_stop(handle);
                esp_timer_delete(handle);
            }
        }
    }
}

#[cfg(target_os = "espidf")]
impl Drop for HwTimers {
    fn drop(&mut self) {
        // SAFETY: handles are owned exclusively by self.
        unsafe {
            esp_timer_stop(self.periodic);
            esp_timer_delete(self.periodic);
            for (_, handle) in core::mem::take(&mut self.oneshots) {
                esp_timer_stop(handle);
                esp_timer_delete(handle);
            }
        }
    }
}

// ── Simulation ────────────────────────────────────────────────

/// Deadline-based stand-in for esp_timer.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct HwTimers {
    /// (period, next deadline)
    periodic: Option<(u32, u64)>,
    /// id -> (generation, deadline)
    oneshots: BTreeMap<DeviceId, (Generation, u64)>,
}

#[cfg(not(target_os = "espidf"))]
impl HwTimers {
    pub fn new() -> Result<Self, HalError> {
        log::info!("hw_timer(sim): deadline timers");
        Ok(Self::default())
    }

    pub fn arm_periodic(&mut self, period_ms: u32, now_ms: u64) -> Result<(), HalError> {
        self.periodic = Some((period_ms, now_ms + u64::from(period_ms)));
        debug!("hw_timer(sim): multiplex every {} ms", period_ms);
        Ok(())
    }

    pub fn disarm_periodic(&mut self) {
        self.periodic = None;
    }

    pub fn arm_oneshot(&mut self, id: DeviceId, generation: Generation, delay_ms: u32, now_ms: u64) -> Result<(), HalError> {
        self.oneshots.insert(id, (generation, now_ms + u64::from(delay_ms)));
        Ok(())
    }

    pub fn cancel_oneshot(&mut self, id: DeviceId) {
        self.oneshots.remove(&id);
    }

    /// Fire everything due at `now_ms`: one-shots in deadline order, then
    /// at most one multiplex tick (missed periods are skipped, as with
    /// `skip_unhandled_events`).
    pub fn poll(&mut self, now_ms: u64, mut fire: impl FnMut(Event)) {
        let mut due: Vec<(u64, DeviceId, Generation)> = self
            .oneshots
            .iter()
            .filter(|&(_, &(_, deadline))| deadline <= now_ms)
            .map(|(&id, &(generation, deadline))| (deadline, id, generation))
            .collect();
        due.sort_unstable();
        for (_, id, generation) in due {
            self.oneshots.remove(&id);
            fire(Event::SafetyTimeout(id, generation));
        }

        if let Some((period, next)) = self.periodic.as_mut() {
            if *next <= now_ms {
                let period = u64::from((*period).max(1));
                *next += (now_ms - *next) / period * period + period;
                fire(Event::MultiplexTick);
            }
        }
    }

    pub fn periodic_armed(&self) -> bool {
        self.periodic.is_some()
    }

    pub fn pending_oneshots(&self) -> usize {
        self.oneshots.len()
    }
}
