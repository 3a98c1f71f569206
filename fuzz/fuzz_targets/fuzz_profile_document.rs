//! Fuzz target: `ProfileDocument::parse` + `records`
//!
//! Feeds arbitrary bytes to the profile parser as if they had been read
//! back from flash, and checks that every accepted document yields
//! records whose pins are pairwise disjoint and that survive a
//! serialize/parse cycle unchanged.
//!
//! cargo fuzz run fuzz_profile_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use railyard::profile::ProfileDocument;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = ProfileDocument::parse(data) else {
        return;
    };
    let Ok(records) = doc.records() else {
        return;
    };

    let mut used = 0u64;
    for r in &records {
        assert_eq!(used & r.pins.mask(), 0, "overlapping pins accepted");
        used |= r.pins.mask();
    }

    let again = ProfileDocument::from_records(&records);
    let bytes = again.to_json().expect("accepted records must serialize");
    let reparsed = ProfileDocument::parse(&bytes).expect("own output must parse");
    assert_eq!(reparsed.records().expect("own output must validate"), records);
});
