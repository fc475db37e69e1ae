#![no_main]
use libfuzzer_sys::fuzz_target;
use helium::parser::{parse, ParseOptions};
use helium::sax::NullSink;

fuzz_target!(|data: &[u8]| {
    // Raw bytes go through encoding detection as well; none of this may panic
    let _ = parse(data, &ParseOptions::default());
    let _ = helium::parse_with_sink(data, &mut NullSink, &ParseOptions::default());
    let unexpanded = ParseOptions::default()
        .expand_entities(false)
        .replace_entities(false)
        .preserve_blanks(false);
    let _ = parse(data, &unexpanded);
});
