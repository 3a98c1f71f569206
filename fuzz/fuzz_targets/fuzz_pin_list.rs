//! Fuzz target: `PinSet::parse_csv` / `PinSet::parse_key`
//!
//! Request pin lists arrive as free text.  Any accepted list must come
//! out sorted and duplicate-free, and its canonical key must parse back
//! to the same set.
//!
//! cargo fuzz run fuzz_pin_list

#![no_main]

use libfuzzer_sys::fuzz_target;
use railyard::device::PinSet;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Ok(set) = PinSet::parse_csv(text) {
        assert!(set.as_slice().windows(2).all(|w| w[0] < w[1]));
        let key = set.key();
        assert_eq!(PinSet::parse_key(key.as_str()), Ok(set));
    }

    // The key parser must reject or accept without panicking.
    let _ = PinSet::parse_key(text);
});
