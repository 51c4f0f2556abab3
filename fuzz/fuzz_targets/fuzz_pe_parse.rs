#![no_main]

use libfuzzer_sys::fuzz_target;
use peview::Pe;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes must never panic or read out of bounds; it
    // either errors or yields a model with a consistent flag subset.
    let _ = Pe::parse(data);
});
