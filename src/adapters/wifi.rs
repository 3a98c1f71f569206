//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`].  Device initialisation waits until the
//! station is associated so the boot sequence can be watched remotely.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` in STA
//!   mode with credentials taken from the NVS-backed WiFi config that
//!   provisioning left behind.
//! - **all other targets**: always connected.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before retrying.

use log::{info, warn};

use crate::app::ports::ConnectivityPort;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};

const MIN_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    secs: u32,
    next_attempt_ms: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            secs: MIN_BACKOFF_SECS,
            next_attempt_ms: 0,
        }
    }

    pub fn due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_attempt_ms
    }

    /// Record a failed attempt at `now_ms` and widen the window.
    pub fn failed(&mut self, now_ms: u64) {
        self.next_attempt_ms = now_ms + u64::from(self.secs) * 1_000;
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn secs(&self) -> u32 {
        self.secs
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WifiAdapter {
    state: WifiState,
    backoff: Backoff,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let esp = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        let mut wifi = BlockingWifi::wrap(esp, sysloop)?;
        wifi.start()?;
        info!("WiFi: station started");
        Ok(Self {
            state: WifiState::Disconnected,
            backoff: Backoff::new(),
            wifi,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            backoff: Backoff::new(),
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> bool {
        match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
            Ok(()) => true,
            Err(e) => {
                warn!("WiFi: connect failed: {}", e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> bool {
        info!("WiFi(sim): connected");
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    /// Try to associate now.
    pub fn connect(&mut self, now_ms: u64) -> bool {
        info!("WiFi: connecting");
        if self.platform_connect() {
            self.state = WifiState::Connected;
            self.backoff.reset();
            info!("WiFi: connected");
            true
        } else {
            self.backoff.failed(now_ms);
            self.state = WifiState::Reconnecting { attempt: 0 };
            false
        }
    }

    /// Drive reconnection.  Call once per main-loop iteration.
    pub fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Reconnecting { attempt } if self.backoff.due(now_ms) => {
                info!(
                    "WiFi: reconnect attempt {} (backoff {}s)",
                    attempt,
                    self.backoff.secs()
                );
                if self.platform_connect() {
                    self.state = WifiState::Connected;
                    self.backoff.reset();
                    info!("WiFi: reconnected");
                } else {
                    self.backoff.failed(now_ms);
                    self.state = WifiState::Reconnecting {
                        attempt: attempt + 1,
                    };
                }
            }
            WifiState::Connected if !self.platform_is_connected() => {
                warn!("WiFi: connection lost, entering reconnect");
                self.state = WifiState::Reconnecting { attempt: 0 };
            }
            _ => {}
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.platform_is_connected()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
