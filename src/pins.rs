//! GPIO numbering and the factory device layout for the Railyard board.
//!
//! Single source of truth for board-level pin facts.  Accessory pins are
//! not fixed: operators assign them at runtime through the registry, and
//! the layout below is only what a fresh board boots into.
//!
//! ## ESP32-S3-WROOM-1 (N8R8) GPIO map
//!
//! | GPIO      | Use                                   |
//! |-----------|---------------------------------------|
//! | 0, 45, 46 | boot-mode and flash-voltage straps    |
//! | 1–18      | accessories                           |
//! | 19, 20    | native USB D-/D+                      |
//! | 21        | accessories                           |
//! | 22–25     | not bonded out                        |
//! | 26–32     | SPI flash and PSRAM bus               |
//! | 33–37     | octal PSRAM data lines                |
//! | 38–42     | accessories                           |
//! | 43, 44    | UART0 console                         |
//! | 47, 48    | accessories                           |
//!
//! GPIO3 is only sampled as a strap when the JTAG-select eFuse is burned,
//! which production boards never do.

/// ESP32-S3 GPIO number (`GPIO17` is `17`).
pub type Pin = u8;

/// Upper bound on the pin universe; the pool is a 64-bit mask.
pub const MAX_PINS: u8 = 64;

/// Highest GPIO number the ESP32-S3 has, plus one.
pub const CHIP_GPIO_COUNT: u8 = 49;

/// GPIOs an accessory may be wired to.
pub const ACCESSORY_GPIOS: [Pin; 26] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 21, 38, 39, 40, 41, 42, 47, 48,
];

/// [`ACCESSORY_GPIOS`] as a pool mask.
pub const ACCESSORY_MASK: u64 = mask_of(&ACCESSORY_GPIOS);

/// Whether `pin` may be driven by an accessory.
pub const fn is_accessory_pin(pin: Pin) -> bool {
    pin < MAX_PINS && ACCESSORY_MASK & (1u64 << pin) != 0
}

const fn mask_of(pins: &[Pin]) -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < pins.len() {
        mask |= 1u64 << pins[i];
        i += 1;
    }
    mask
}

/// Kind used for the factory layout.
pub const DEFAULT_KIND: &str = "RelayTrainSwitch";

/// Factory layout: twelve two-coil relay switches on adjacent accessory
/// GPIOs.  GPIO21 and GPIO42 stay free.
pub const DEFAULT_LAYOUT: [[Pin; 2]; 12] = [
    [1, 2],
    [3, 4],
    [5, 6],
    [7, 8],
    [9, 10],
    [11, 12],
    [13, 14],
    [15, 16],
    [17, 18],
    [38, 39],
    [40, 41],
    [47, 48],
];
