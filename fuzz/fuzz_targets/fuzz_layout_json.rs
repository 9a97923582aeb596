#![no_main]

use libfuzzer_sys::fuzz_target;
use vtlock_core::{Decoder, DecoderConfig, KeyboardTables, Layout};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Rejected layouts are fine; accepted ones must decode anything.
    let Ok(layout) = Layout::from_json_str(text) else {
        return;
    };
    let tables = KeyboardTables::new(layout);
    let mut decoder = Decoder::new(&tables, DecoderConfig::default());
    for raw in 0..=u8::MAX {
        let _ = decoder.handle_event(raw);
    }
});
