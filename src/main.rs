//! Railyard firmware entry point.
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter        LogEventSink   NvsAdapter  WifiAdapter │
//! │  (Gpio+Timer+Clock)     (EventSink)    (Config+    (Connect-   │
//! │                                         Storage)    ivity)     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Registry · PinPool · Multiplexer · Interlock          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  esp_timer callbacks ──▶ lock-free event queue ──▶ main loop   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use railyard::adapters::hardware::HardwareAdapter;
use railyard::adapters::log_sink::LogEventSink;
use railyard::adapters::nvs::NvsAdapter;
use railyard::adapters::time::SystemClock;
use railyard::adapters::wifi::WifiAdapter;
use railyard::app::ports::{ClockPort, ConfigPort, ConnectivityPort};
use railyard::app::service::AppService;
use railyard::config::SystemConfig;
use railyard::drivers::hw_timer::HwTimers;
use railyard::events;

/// Main-loop sleep between queue drains.
const LOOP_DELAY_MS: u32 = 5;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Railyard v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => anyhow::bail!("NVS init failed: {}", e),
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    if config.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // ── 3. Construct adapters ─────────────────────────────────
    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop, nvs_partition)?;
    let timers = HwTimers::new().map_err(|e| anyhow::anyhow!("timer init failed: {}", e))?;
    let mut hw = HardwareAdapter::new(timers, SystemClock::new());
    let mut log_sink = LogEventSink::new();

    if !wifi.connect(hw.now_ms()) {
        warn!("WiFi not up yet; devices start once it connects");
    }

    // ── 4. Construct app service ──────────────────────────────
    let mut app = AppService::new(config, nvs);

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    loop {
        if !app.is_initialized() && wifi.is_connected() {
            app.initialize(&mut hw, &mut log_sink);
        }

        events::drain_events(|event| app.handle_event(event, &mut hw, &mut log_sink));
        app.enforce_safety_deadlines(&mut hw, &mut log_sink);

        let now = hw.now_ms();
        wifi.poll(now);

        if app.restart_due(now) {
            info!("Restarting");
            esp_idf_svc::hal::reset::restart();
        }

        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}
