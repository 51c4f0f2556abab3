#![no_main]

use libfuzzer_sys::fuzz_target;
use peview::Pe;

fuzz_target!(|data: &[u8]| {
    // Flattening a tree parsed from arbitrary bytes must terminate and
    // yield one row per leaf regardless of how mangled the input is.
    if let Ok(pe) = Pe::parse(data) {
        let _ = pe.flatten_resources();
    }
});
