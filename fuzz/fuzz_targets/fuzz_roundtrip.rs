#![no_main]
use libfuzzer_sys::fuzz_target;
use helium::parser::{parse_str, ParseOptions};
use helium::serial::serialize;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let opts = ParseOptions::default();
        // Parse -> serialize -> parse roundtrip should never panic
        if let Ok(doc) = parse_str(s, &opts) {
            let output = serialize(&doc);
            let _ = parse_str(&output, &opts);
        }
    }
});
