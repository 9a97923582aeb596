//! Property-based tests for the keystroke decoder and output encoder.
//!
//! 1. **UTF-8 round trip**: every Unicode scalar encodes to at most four
//!    bytes that decode back to it; everything else encodes to nothing.
//!
//! 2. **Modifier symmetry**: press k, any non-modifier traffic, release k
//!    clears k's bit and leaves the other held bits alone.
//!
//! 3. **Robustness**: arbitrary byte streams never panic, and every token is
//!    encodable.
//!
//! 4. **Unmapped input**: with no keymaps (or an all-hole keymap) no byte
//!    ever produces output.
//!
//! 5. **Composition**: layout accents beat the fallback table, and misses
//!    emit the diacritic and the base separately.

use proptest::prelude::*;
use vtlock_core::{
    ComposeEntry, Decoder, DecoderConfig, KeyCategory, KeySym, KeyboardTables, Layout,
    ModifierMask, OutputEncoder, Outcome, Token, encode_utf8,
};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Modifier keys of the US layout with distinct mask bits.
const MODIFIER_KEYS: [(u8, ModifierMask); 4] = [
    (42, ModifierMask::SHIFT),
    (29, ModifierMask::CTRL),
    (56, ModifierMask::ALT),
    (100, ModifierMask::ALTGR),
];

/// Every US scancode bound to a modifier.
const US_MODIFIER_SCANCODES: [u8; 6] = [29, 42, 54, 56, 97, 100];

fn no_abort() -> DecoderConfig {
    DecoderConfig::default().with_abort_key(None)
}

fn non_modifier_event() -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("modifier key", |raw| {
        !US_MODIFIER_SCANCODES.contains(&(raw & 0x7F))
    })
}

/// A layout with a table-assisted dead key on scancode 1 and a Latin key on
/// scancode 2.
fn dead_then_base(diacritic: u8, base: u8) -> Layout {
    Layout::builder()
        .bind(ModifierMask::NONE, 1, KeySym::new(KeyCategory::Dead2, diacritic))
        .bind(ModifierMask::NONE, 2, KeySym::latin(base))
        .build()
}

fn tokens(outcome: Outcome<'_>) -> Vec<Token<'_>> {
    match outcome {
        Outcome::Emit(emission) => emission.tokens().collect(),
        Outcome::Abort => Vec::new(),
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1. UTF-8
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn utf8_round_trips_scalars(ch in any::<char>()) {
        let bytes = encode_utf8(ch as i32);
        prop_assert!(bytes.len() <= 4);
        let text = std::str::from_utf8(bytes.as_bytes()).unwrap();
        prop_assert_eq!(text.chars().collect::<Vec<_>>(), vec![ch]);
    }

    #[test]
    fn utf8_rejects_non_scalars(cp in prop_oneof![
        i32::MIN..0,
        0xD800i32..=0xDFFF,
        0x11_0000i32..=i32::MAX,
    ]) {
        prop_assert!(encode_utf8(cp).is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Modifier symmetry
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn modifier_press_release_is_symmetric(
        key in 0usize..MODIFIER_KEYS.len(),
        held in proptest::collection::vec(0usize..MODIFIER_KEYS.len(), 0..4),
        traffic in proptest::collection::vec(non_modifier_event(), 0..64),
    ) {
        let tables = KeyboardTables::new(Layout::us());
        let mut decoder = Decoder::new(&tables, no_abort());

        let (scancode, bit) = MODIFIER_KEYS[key];
        for &other in held.iter().filter(|&&other| other != key) {
            decoder.handle_event(MODIFIER_KEYS[other].0);
        }
        let before = decoder.modifiers();

        decoder.handle_event(scancode);
        prop_assert!(decoder.modifiers().contains(bit));
        for raw in traffic {
            decoder.handle_event(raw);
        }
        decoder.handle_event(scancode | 0x80);

        prop_assert!(!decoder.modifiers().contains(bit));
        prop_assert_eq!(decoder.modifiers(), before - bit);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Robustness
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn arbitrary_streams_decode_without_panicking(
        events in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let tables = KeyboardTables::new(Layout::us());
        let mut decoder = Decoder::new(&tables, no_abort());
        let mut encoder = OutputEncoder::new(Vec::new());

        for raw in events {
            let Outcome::Emit(emission) = decoder.handle_event(raw) else {
                return Err(TestCaseError::fail("abort with no abort key"));
            };
            prop_assert!(emission.len() <= 2);
            for token in emission.tokens() {
                if let Token::CodePoint(cp) = token {
                    prop_assert!(!encode_utf8(cp).is_empty(), "unencodable {cp:#x}");
                }
            }
            encoder.emit(&emission).unwrap();
        }

        prop_assert!(std::str::from_utf8(encoder.get_ref()).is_ok());
    }

    #[test]
    fn abort_key_stops_before_output(
        prefix in proptest::collection::vec(non_modifier_event(), 0..32),
    ) {
        let tables = KeyboardTables::new(Layout::us());
        let mut decoder = Decoder::new(&tables, DecoderConfig::default());
        for raw in prefix {
            if decoder.handle_event(raw).is_abort() {
                return Ok(());
            }
        }
        // Plain 'q'; modifiers were never pressed.
        prop_assert_eq!(decoder.handle_event(16), Outcome::Abort);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Unmapped input
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unmapped_layouts_emit_nothing(
        events in proptest::collection::vec(any::<u8>(), 0..128),
        with_keymap in any::<bool>(),
    ) {
        let layout = if with_keymap {
            Layout::builder().keymap(ModifierMask::NONE).build()
        } else {
            Layout::default()
        };
        let tables = KeyboardTables::new(layout);
        let mut decoder = Decoder::new(&tables, DecoderConfig::default());
        for raw in events {
            prop_assert!(decoder.handle_event(raw).is_empty());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Composition
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn native_accent_beats_fallback(
        diacritic in 1u8..=255,
        base in any::<u8>(),
        native in any::<char>(),
        fallback in any::<char>(),
    ) {
        prop_assume!(native != fallback);
        let layout = Layout::builder()
            .bind(ModifierMask::NONE, 1, KeySym::new(KeyCategory::Dead2, diacritic))
            .bind(ModifierMask::NONE, 2, KeySym::latin(base))
            .accent(ComposeEntry {
                diacritic: u32::from(diacritic),
                base: u32::from(base),
                result: native as u32,
            })
            .build();
        let tables = KeyboardTables::new(layout).with_fallback(vec![ComposeEntry {
            diacritic: u32::from(diacritic),
            base: u32::from(base),
            result: fallback as u32,
        }]);
        let mut decoder = Decoder::new(&tables, no_abort());

        prop_assert!(decoder.handle_event(1).is_empty());
        prop_assert_eq!(
            tokens(decoder.handle_event(2)),
            vec![Token::CodePoint(native as i32)]
        );
    }

    #[test]
    fn composition_miss_emits_literals(diacritic in 1u8..=255, base in any::<u8>()) {
        let tables = KeyboardTables::new(dead_then_base(diacritic, base)).with_fallback(Vec::new());
        let mut decoder = Decoder::new(&tables, no_abort());

        decoder.handle_event(1);
        let out = tokens(decoder.handle_event(2));
        let expected = if base == b' ' {
            vec![Token::CodePoint(i32::from(diacritic))]
        } else if base == diacritic {
            vec![Token::CodePoint(i32::from(base))]
        } else {
            vec![Token::CodePoint(i32::from(diacritic)), Token::CodePoint(i32::from(base))]
        };
        prop_assert_eq!(out, expected);
        prop_assert_eq!(decoder.pending_diacritic(), None);
    }
}
