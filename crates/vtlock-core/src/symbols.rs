#![forbid(unsafe_code)]

//! Named-symbol table: fixed output strings for non-text keys.
//!
//! A key that has no entry here produces no fixed string. For letters,
//! Latin symbols and meta keys the output is computed from the key value
//! instead; for everything else an absent entry means the key is inert.

use ahash::AHashMap;

use crate::keysym::{KeyCategory, cur, dead, pad, spec};

/// Fixed strings keyed by `(category, value)`.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    entries: AHashMap<(KeyCategory, u8), &'static str>,
}

impl SymbolTable {
    /// An empty table: every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// The strings the Linux console produces for Enter, the keypad, the
    /// arrows, and the single-byte dead-key diacritics.
    ///
    /// Console switching, boot, SAK, scroll and lock keys are deliberately
    /// absent so that they stay inert.
    #[must_use]
    pub fn linux_console() -> Self {
        let mut table = Self::empty();

        table.insert(KeyCategory::Spec, spec::ENTER, "\n");

        const PAD: [(u8, &str); 20] = [
            (pad::P0, "0"),
            (pad::P1, "1"),
            (pad::P2, "2"),
            (pad::P3, "3"),
            (pad::P4, "4"),
            (pad::P5, "5"),
            (pad::P6, "6"),
            (pad::P7, "7"),
            (pad::P8, "8"),
            (pad::P9, "9"),
            (pad::PLUS, "+"),
            (pad::MINUS, "-"),
            (pad::STAR, "*"),
            (pad::SLASH, "/"),
            (pad::ENTER, "\n"),
            (pad::COMMA, ","),
            (pad::DOT, "."),
            (pad::PLUSMINUS, "±"),
            (pad::PARENL, "("),
            (pad::PARENR, ")"),
        ];
        for (value, text) in PAD {
            table.insert(KeyCategory::Pad, value, text);
        }

        table.insert(KeyCategory::Dead, dead::GRAVE, "`");
        table.insert(KeyCategory::Dead, dead::ACUTE, "'");
        table.insert(KeyCategory::Dead, dead::CIRCUMFLEX, "^");
        table.insert(KeyCategory::Dead, dead::TILDE, "~");
        table.insert(KeyCategory::Dead, dead::DIAERESIS, "\"");
        table.insert(KeyCategory::Dead, dead::CEDILLA, ",");

        table.insert(KeyCategory::Cur, cur::DOWN, "\x1b[B");
        table.insert(KeyCategory::Cur, cur::LEFT, "\x1b[D");
        table.insert(KeyCategory::Cur, cur::RIGHT, "\x1b[C");
        table.insert(KeyCategory::Cur, cur::UP, "\x1b[A");

        table
    }

    /// Register (or replace) the fixed string for `(category, value)`.
    pub fn insert(&mut self, category: KeyCategory, value: u8, text: &'static str) {
        self.entries.insert((category, value), text);
    }

    /// The fixed string for `(category, value)`, if any.
    #[must_use]
    pub fn get(&self, category: KeyCategory, value: u8) -> Option<&'static str> {
        self.entries.get(&(category, value)).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::linux_console()
    }
}
