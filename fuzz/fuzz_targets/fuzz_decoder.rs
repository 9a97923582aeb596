#![no_main]

use libfuzzer_sys::fuzz_target;
use vtlock_core::{
    Decoder, DecoderConfig, KeyboardTables, Layout, Outcome, OutputEncoder, Token, encode_utf8,
};

fuzz_target!(|data: &[u8]| {
    let tables = KeyboardTables::new(Layout::us());
    let mut decoder = Decoder::new(&tables, DecoderConfig::default().with_abort_key(None));
    let mut encoder = OutputEncoder::new(Vec::new());

    for &raw in data {
        let Outcome::Emit(emission) = decoder.handle_event(raw) else {
            panic!("abort without an abort key");
        };
        for token in emission.tokens() {
            if let Token::CodePoint(cp) = token {
                let bytes = encode_utf8(cp);
                assert!(!bytes.is_empty() && bytes.len() <= 4, "bad code point {cp:#x}");
            }
        }
        encoder.emit(&emission).expect("Vec sink cannot fail");
    }

    assert!(std::str::from_utf8(encoder.get_ref()).is_ok());
});
