//! Sorted, duplicate-free pin tuple identifying a device.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DeviceError;
use crate::pins::{MAX_PINS, Pin};

/// No device kind uses more than two lines; leave headroom for composites.
pub const MAX_DEVICE_PINS: usize = 4;

/// Canonical registry key, e.g. `"(2,3)"` or `"(5,)"`.
pub type PinKey = heapless::String<24>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinSet(heapless::Vec<Pin, MAX_DEVICE_PINS>);

impl PinSet {
    /// Build from pins in any order.
    ///
    /// A repeated pin is `PinUnavailable`; an empty or oversized list is
    /// `InvalidPinCount`.
    pub fn new(pins: &[Pin]) -> Result<Self, DeviceError> {
        if pins.is_empty() || pins.len() > MAX_DEVICE_PINS {
            return Err(DeviceError::InvalidPinCount {
                expected: MAX_DEVICE_PINS.min(pins.len().max(1)),
                found: pins.len(),
            });
        }
        let mut sorted: heapless::Vec<Pin, MAX_DEVICE_PINS> = heapless::Vec::new();
        for &p in pins {
            if p >= MAX_PINS {
                return Err(DeviceError::PinUnavailable(p));
            }
            // Capacity is checked above.
            let _ = sorted.push(p);
        }
        sorted.sort_unstable();
        if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(DeviceError::PinUnavailable(w[0]));
        }
        Ok(Self(sorted))
    }

    /// Parse the comma-separated wire form, e.g. `"3, 2"`.
    pub fn parse_csv(input: &str) -> Result<Self, DeviceError> {
        let mut pins: heapless::Vec<Pin, MAX_DEVICE_PINS> = heapless::Vec::new();
        for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let pin = part
                .parse::<Pin>()
                .map_err(|_| DeviceError::InvalidParameter("pins must be integers 0-63"))?;
            pins.push(pin).map_err(|_| DeviceError::InvalidPinCount {
                expected: MAX_DEVICE_PINS,
                found: input.split(',').count(),
            })?;
        }
        Self::new(&pins)
    }

    /// Parse the canonical key form, e.g. `"(2,3)"` or `"(5,)"`.
    pub fn parse_key(key: &str) -> Result<Self, DeviceError> {
        let inner = key
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or(DeviceError::InvalidParameter("pin key must look like (a,b)"))?;
        Self::parse_csv(inner)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Pin> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Pin] {
        &self.0
    }

    /// Bit `p` set for every pin `p`.
    pub fn mask(&self) -> u64 {
        self.0.iter().fold(0, |m, &p| m | (1u64 << p))
    }

    pub fn key(&self) -> PinKey {
        let mut s = PinKey::new();
        // Four two-digit pins plus punctuation always fit.
        let _ = fmt::write(&mut s, format_args!("{self}"));
        s
    }
}

impl fmt::Display for PinSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p}")?;
        }
        if self.0.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

impl Serialize for PinSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PinSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pins = heapless::Vec::<Pin, MAX_DEVICE_PINS>::deserialize(deserializer)?;
        Self::new(&pins).map_err(serde::de::Error::custom)
    }
}
