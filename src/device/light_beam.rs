//! Addressable-LED chase ("light beam").
//!
//! A beam of at most `beam_length` lit pixels slides along a WS2812 strip.
//! The same routine either animates the strip or, in measuring mode,
//! only adds up the delays the animation would sleep, so the multiplexer
//! can be told exactly how long one cycle occupies the timer.

use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use super::{ActionContext, BuildContext, Command, DeviceId, Driver, EffectSummary, MAX_DEVICE_PINS, release_all, summary};
use crate::app::ports::{Hardware, Rgb};
use crate::config::SystemConfig;
use crate::error::{DeviceError, HalError};
use crate::pins::Pin;

const DARK: Rgb = (0, 0, 0);
pub const MAX_PIXELS: u16 = 1024;
const MAX_DELAY_MS: i64 = 10_000;

/// Light-beam parameters as they arrive over the wire or from a profile.
/// Missing fields take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_at_end: Option<i64>,
}

/// Validated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beam {
    pub n: u16,
    pub color: Rgb,
    pub delay_ms: u32,
    pub beam_length: u16,
    pub reverse_at_end: bool,
}

fn channel(v: Option<i64>, default: u8) -> Result<u8, DeviceError> {
    v.map_or(Ok(default), |v| {
        u8::try_from(v).map_err(|_| DeviceError::InvalidParameter("colour channels must be 0-255"))
    })
}

impl Beam {
    pub fn resolve(params: Option<&BeamParams>, config: &SystemConfig) -> Result<Self, DeviceError> {
        let p = params.cloned().unwrap_or_default();
        let n = p.n.unwrap_or(i64::from(config.beam_pixels));
        if !(1..=i64::from(MAX_PIXELS)).contains(&n) {
            return Err(DeviceError::InvalidParameter("n must be 1-1024"));
        }
        let delay = p.delay.unwrap_or(i64::from(config.beam_delay_ms));
        if delay < 0 {
            return Err(DeviceError::InvalidParameter("delay must be positive"));
        }
        if delay > MAX_DELAY_MS {
            return Err(DeviceError::InvalidParameter("delay must be at most 10000"));
        }
        let beam_length = p.beam_length.unwrap_or(i64::from(config.beam_length));
        if beam_length < 1 || beam_length > n {
            return Err(DeviceError::InvalidParameter("beam_length must be 1..=n"));
        }
        let reverse_at_end = match p.reverse_at_end {
            None => config.beam_reverse,
            Some(0) => false,
            Some(1) => true,
            Some(_) => return Err(DeviceError::InvalidParameter("reverse_at_end must be 0 or 1")),
        };
        let (r, g, b) = config.beam_rgb;
        Ok(Self {
            n: n as u16,
            color: (channel(p.r, r)?, channel(p.g, g)?, channel(p.b, b)?),
            delay_ms: delay as u32,
            beam_length: beam_length as u16,
            reverse_at_end,
        })
    }

    /// Duration of one slide across the strip.
    pub fn slide_ms(&self) -> u32 {
        (2 * u32::from(self.n) + u32::from(self.beam_length) - 1) * self.delay_ms
    }
}

impl From<Beam> for BeamParams {
    fn from(b: Beam) -> Self {
        Self {
            n: Some(b.n.into()),
            r: Some(b.color.0.into()),
            g: Some(b.color.1.into()),
            b: Some(b.color.2.into()),
            delay: Some(b.delay_ms.into()),
            beam_length: Some(b.beam_length.into()),
            reverse_at_end: Some(b.reverse_at_end.into()),
        }
    }
}

#[derive(Debug)]
pub struct LightBeam {
    pins: heapless::Vec<Pin, MAX_DEVICE_PINS>,
    beam: Beam,
    frame: Vec<Rgb>,
}

pub(crate) fn build(ctx: &mut BuildContext<'_>) -> Result<Driver, DeviceError> {
    let beam = Beam::resolve(ctx.params, ctx.config)?;
    let mut pins = heapless::Vec::new();
    for &pin in ctx.pins.iter() {
        if let Err(e) = ctx.hw.configure_pixels(pin, beam.n) {
            release_all(ctx.hw, pins.iter().copied());
            return Err(e.into());
        }
        let _ = pins.push(pin);
    }
    Ok(Driver::LightBeam(LightBeam {
        pins,
        beam,
        frame: vec![DARK; usize::from(beam.n)],
    }))
}

impl LightBeam {
    pub fn beam(&self) -> Beam {
        self.beam
    }

    fn write(&self, hw: &mut dyn Hardware) -> Result<(), HalError> {
        for &pin in &self.pins {
            hw.write_pixels(pin, &self.frame)?;
        }
        Ok(())
    }

    fn set_and_write(&mut self, hw: &mut dyn Hardware, i: usize, color: Rgb) -> Result<(), HalError> {
        self.frame[i] = color;
        self.write(hw)
    }

    pub fn pixels_reset(&mut self, hw: &mut dyn Hardware) -> Result<(), HalError> {
        self.frame.fill(DARK);
        self.write(hw)
    }

    /// Slide the beam once.  With `measure_time` nothing is written and
    /// nothing sleeps; the return value is the time the real run takes.
    pub fn pixels_cycle(
        &mut self,
        hw: &mut dyn Hardware,
        color: Rgb,
        reverse: bool,
        measure_time: bool,
    ) -> Result<u32, HalError> {
        let n = usize::from(self.beam.n);
        let beam_length = usize::from(self.beam.beam_length);
        let delay = self.beam.delay_ms;
        let mut total = 0u32;
        let mut queue: VecDeque<usize> = VecDeque::with_capacity(beam_length + 1);

        for step in 0..n {
            let i = if reverse { n - 1 - step } else { step };
            queue.push_back(i);
            if !measure_time {
                self.set_and_write(hw, i, color)?;
                hw.delay_ms(delay);
            }
            total += delay;

            if queue.len() >= beam_length {
                if let Some(j) = queue.pop_front() {
                    if !measure_time {
                        self.set_and_write(hw, j, DARK)?;
                    }
                }
            }
            if !measure_time {
                hw.delay_ms(delay);
            }
            total += delay;
        }

        let tail: Vec<usize> = if reverse {
            queue.into_iter().rev().collect()
        } else {
            queue.into_iter().collect()
        };
        for j in tail {
            if !measure_time {
                self.set_and_write(hw, j, DARK)?;
                hw.delay_ms(delay);
            }
            total += delay;
        }
        Ok(total)
    }

    /// One full animation: forward, then back when `reverse_at_end`.
    pub fn on_action(&mut self, hw: &mut dyn Hardware, measure_time: bool) -> Result<u32, HalError> {
        let color = self.beam.color;
        let mut total = self.pixels_cycle(hw, color, false, measure_time)?;
        if self.beam.reverse_at_end {
            total += self.pixels_cycle(hw, color, true, measure_time)?;
        }
        Ok(total)
    }

    /// Multiplexer tick.
    pub fn run(&mut self, hw: &mut dyn Hardware) -> Result<(), DeviceError> {
        self.on_action(hw, false)?;
        Ok(())
    }

    pub fn apply(
        &mut self,
        ctx: &mut ActionContext<'_>,
        id: DeviceId,
        cmd: Command,
    ) -> Result<EffectSummary, DeviceError> {
        match cmd {
            Command::On => {
                let period = self.on_action(ctx.hw, true)?;
                ctx.multiplexer.enqueue(ctx.hw, id, period);
                Ok(summary(format_args!("chase every {}ms", period)))
            }
            Command::Off | Command::Neutral => {
                ctx.multiplexer.dequeue(ctx.hw, id);
                self.pixels_reset(ctx.hw)?;
                Ok(summary(format_args!("dark")))
            }
        }
    }

    pub fn close(&mut self, ctx: &mut ActionContext<'_>, id: DeviceId) {
        ctx.multiplexer.dequeue(ctx.hw, id);
        if let Err(e) = self.pixels_reset(ctx.hw) {
            warn!("LightBeam: blanking on close failed: {}", e);
        }
        release_all(ctx.hw, self.pins.iter().copied());
    }
}
