#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vtlock_core::{
    ComposeEntry, Decoder, DecoderConfig, KeySym, KeyboardTables, Layout, ModifierMask, Outcome,
};

/// An arbitrary layout plus an event stream to decode against it.
#[derive(Debug, Arbitrary)]
struct Input {
    bindings: Vec<(u16, u8, u16)>,
    funcs: Vec<(u8, String)>,
    accents: Vec<(char, char, char)>,
    abort_key: Option<u8>,
    events: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut builder = Layout::builder();
    for (mask, scancode, word) in input.bindings {
        builder = builder.bind(
            ModifierMask::from_bits_retain(mask % 512),
            scancode,
            KeySym::from_raw(word),
        );
    }
    for (index, text) in input.funcs {
        builder = builder.func(index, text);
    }
    for (d, b, r) in input.accents {
        builder = builder.accent(ComposeEntry::new(d, b, r));
    }

    let tables = KeyboardTables::new(builder.build());
    let config = DecoderConfig::default().with_abort_key(input.abort_key);
    let mut decoder = Decoder::new(&tables, config);

    for raw in input.events {
        match decoder.handle_event(raw) {
            Outcome::Emit(emission) => assert!(emission.len() <= 2),
            Outcome::Abort => {
                assert!(input.abort_key.is_some());
                break;
            }
        }
    }
});
