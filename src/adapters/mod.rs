//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `hardware`     | GpioPort           | ESP32 GPIO, LEDC, RMT        |
//! |                | TimerPort          | esp_timer                    |
//! |                | ClockPort          | ESP32 system timer           |
//! | `log_sink`     | EventSink          | Serial log output            |
//! | `nvs`          | ConfigPort         | NVS / in-memory store        |
//! |                | StoragePort        |                              |
//! | `time`         | (DelayNs)          | ESP32 system timer           |
//! | `wifi`         | ConnectivityPort   | ESP-IDF WiFi STA             |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
