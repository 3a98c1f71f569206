//! WS2812 strips driven through the RMT peripheral.
//!
//! Each strip owns one RMT TX channel.  A frame is expanded to one RMT
//! item per bit (GRB order, MSB first) and sent blocking; the driver
//! appends the latch gap itself via the idle level.
//!
//! On simulation targets [`PixelStrips`] only records the last frame.

use std::collections::BTreeMap;

use log::debug;

use crate::app::ports::Rgb;
use crate::error::HalError;
use crate::pins::Pin;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// RMT TX channels available for strips.
pub const RMT_CHANNELS: usize = 4;

/// RMT tick with an 80 MHz APB clock divided by 2: 25 ns.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const CLK_DIV: u8 = 2;
const T0H: u32 = 16; // 400 ns
const T0L: u32 = 34; // 850 ns
const T1H: u32 = 32; // 800 ns
const T1L: u32 = 18; // 450 ns

/// Raw RMT item: `duration0:15 | level0:1 | duration1:15 | level1:1`.
const fn item(high: u32, low: u32) -> u32 {
    high | (1 << 15) | (low << 16)
}

const BIT0: u32 = item(T0H, T0L);
const BIT1: u32 = item(T1H, T1L);

/// Expand `frame` into RMT items, 24 per pixel.
pub fn encode_frame(frame: &[Rgb], out: &mut Vec<u32>) {
    out.clear();
    out.reserve(frame.len() * 24);
    for &(r, g, b) in frame {
        let grb = (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b);
        out.extend((0..24).rev().map(|bit| {
            if (grb >> bit) & 1 == 1 { BIT1 } else { BIT0 }
        }));
    }
}

struct Strip {
    channel: u8,
    count: u16,
    #[cfg(not(target_os = "espidf"))]
    last: Vec<Rgb>,
}

/// Every strip currently claimed, keyed by data pin.
#[derive(Default)]
pub struct PixelStrips {
    strips: BTreeMap<Pin, Strip>,
    items: Vec<u32>,
}

impl PixelStrips {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an RMT channel for a `count`-pixel strip on `pin`.
    pub fn configure(&mut self, pin: Pin, count: u16) -> Result<(), HalError> {
        if let Some(strip) = self.strips.get_mut(&pin) {
            strip.count = count;
            return Ok(());
        }
        let channel = (0..RMT_CHANNELS as u8)
            .find(|ch| self.strips.values().all(|s| s.channel != *ch))
            .ok_or(HalError::NoFreeChannel(pin))?;
        install(pin, channel)?;
        self.strips.insert(
            pin,
            Strip {
                channel,
                count,
                #[cfg(not(target_os = "espidf"))]
                last: Vec::new(),
            },
        );
        debug!("Pixels: GPIO{} on RMT channel {} ({} px)", pin, channel, count);
        Ok(())
    }

    /// Send one frame.  Its length must match the configured count.
    pub fn write(&mut self, pin: Pin, frame: &[Rgb]) -> Result<(), HalError> {
        let strip = self
            .strips
            .get_mut(&pin)
            .ok_or(HalError::PixelWriteFailed(pin))?;
        if frame.len() != usize::from(strip.count) {
            return Err(HalError::PixelWriteFailed(pin));
        }
        encode_frame(frame, &mut self.items);
        transmit(pin, strip.channel, &self.items)?;
        #[cfg(not(target_os = "espidf"))]
        {
            strip.last.clear();
            strip.last.extend_from_slice(frame);
        }
        Ok(())
    }

    /// Free the channel behind `pin`.  Returns `false` if none was claimed.
    pub fn release(&mut self, pin: Pin) -> bool {
        match self.strips.remove(&pin) {
            Some(strip) => {
                uninstall(strip.channel);
                true
            }
            None => false,
        }
    }

    pub fn is_strip(&self, pin: Pin) -> bool {
        self.strips.contains_key(&pin)
    }

    /// Last frame sent to `pin`.
    #[cfg(not(target_os = "espidf"))]
    pub fn last_frame(&self, pin: Pin) -> Option<&[Rgb]> {
        self.strips.get(&pin).map(|s| s.last.as_slice())
    }
}

#[cfg(target_os = "espidf")]
fn install(pin: Pin, channel: u8) -> Result<(), HalError> {
    let mut cfg = rmt_config_t {
        rmt_mode: rmt_mode_t_RMT_MODE_TX,
        channel: u32::from(channel),
        gpio_num: i32::from(pin),
        clk_div: CLK_DIV,
        mem_block_num: 1,
        flags: 0,
        ..Default::default()
    };
    cfg.__bindgen_anon_1.tx_config = rmt_tx_config_t {
        idle_level: rmt_idle_level_t_RMT_IDLE_LEVEL_LOW,
        idle_output_en: true,
        ..Default::default()
    };
    // SAFETY: the channel number comes from PixelStrips, which never hands
    // one channel to two pins.  Main-loop only.
    unsafe {
        if rmt_config(&cfg) != ESP_OK || rmt_driver_install(u32::from(channel), 0, 0) != ESP_OK {
            return Err(HalError::PinConfigFailed(pin));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn install(_pin: Pin, _channel: u8) -> Result<(), HalError> {
    Ok(())
}

#[cfg(target_os = "espidf")]
fn transmit(pin: Pin, channel: u8, items: &[u32]) -> Result<(), HalError> {
    // SAFETY: rmt_item32_t is a 32-bit union over the same bit layout, and
    // the blocking write finishes before `items` can change.
    let ret = unsafe {
        rmt_write_items(
            u32::from(channel),
            items.as_ptr() as *const rmt_item32_t,
            items.len() as i32,
            true,
        )
    };
    if ret != ESP_OK {
        return Err(HalError::PixelWriteFailed(pin));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn transmit(_pin: Pin, _channel: u8, _items: &[u32]) -> Result<(), HalError> {
    Ok(())
}

#[cfg(target_os = "espidf")]
fn uninstall(channel: u8) {
    // SAFETY: the driver was installed by install() for this channel.
    unsafe {
        rmt_driver_uninstall(u32::from(channel));
    }
}

#[cfg(not(target_os = "espidf"))]
fn uninstall(_channel: u8) {}
