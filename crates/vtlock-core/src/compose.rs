#![forbid(unsafe_code)]

//! Dead-key composition.
//!
//! The console treats dead keys and the compose key the same way: a
//! diacritic is remembered and combined with the next base character by
//! looking the pair up in a table. Layouts ship their own table; when it
//! has no entry for a pair, [`FALLBACK_COMPOSE`] is consulted.
//!
//! Both tables are ordered and scanned linearly, first match wins.

use serde::{Deserialize, Serialize};

/// One `(diacritic, base) -> result` composition.
///
/// `diacritic` and `base` are in the order they are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32, u32)", into = "(u32, u32, u32)")]
pub struct ComposeEntry {
    pub diacritic: u32,
    pub base: u32,
    pub result: u32,
}

impl ComposeEntry {
    #[must_use]
    pub const fn new(diacritic: char, base: char, result: char) -> Self {
        Self {
            diacritic: diacritic as u32,
            base: base as u32,
            result: result as u32,
        }
    }

    #[must_use]
    pub const fn matches(&self, diacritic: u32, base: u32) -> bool {
        self.diacritic == diacritic && self.base == base
    }
}

impl From<(u32, u32, u32)> for ComposeEntry {
    fn from((diacritic, base, result): (u32, u32, u32)) -> Self {
        Self {
            diacritic,
            base,
            result,
        }
    }
}

impl From<ComposeEntry> for (u32, u32, u32) {
    fn from(entry: ComposeEntry) -> Self {
        (entry.diacritic, entry.base, entry.result)
    }
}

/// What a pending diacritic and a base character turn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// A table entry matched.
    Composed(u32),
    /// No entry, base was a space: the bare diacritic.
    Bare(u32),
    /// No entry: the diacritic followed by the base, uncombined.
    Uncombined { diacritic: u32, base: u32 },
    /// No entry, base equals the diacritic: the base alone.
    Base(u32),
}

/// Combine `diacritic` with `base`.
///
/// Searches `native` first and `fallback` second. Never fails: a miss
/// degrades to the literal characters that were typed.
#[must_use]
pub fn compose(
    native: &[ComposeEntry],
    fallback: &[ComposeEntry],
    diacritic: u32,
    base: u32,
) -> Composition {
    let hit = native
        .iter()
        .chain(fallback)
        .find(|entry| entry.matches(diacritic, base));

    match hit {
        Some(entry) => Composition::Composed(entry.result),
        None if base == u32::from(b' ') => Composition::Bare(diacritic),
        None if base != diacritic => Composition::Uncombined { diacritic, base },
        None => Composition::Base(base),
    }
}

/// Built-in compositions for the upper half of Latin-1.
///
/// Besides the usual accents this includes letter digraphs typed through
/// the compose key: `oa`, `0a` and `aa` all give `å`, `ss` and `sz` give
/// `ß`, and `ij` gives `ÿ` (the console cannot show `ĳ`).
pub const FALLBACK_COMPOSE: &[ComposeEntry] = &[
    ComposeEntry::new('`', 'A', 'À'),
    ComposeEntry::new('`', 'a', 'à'),
    ComposeEntry::new('\'', 'A', 'Á'),
    ComposeEntry::new('\'', 'a', 'á'),
    ComposeEntry::new('^', 'A', 'Â'),
    ComposeEntry::new('^', 'a', 'â'),
    ComposeEntry::new('~', 'A', 'Ã'),
    ComposeEntry::new('~', 'a', 'ã'),
    ComposeEntry::new('"', 'A', 'Ä'),
    ComposeEntry::new('"', 'a', 'ä'),
    ComposeEntry::new('O', 'A', 'Å'),
    ComposeEntry::new('o', 'a', 'å'),
    ComposeEntry::new('0', 'A', 'Å'),
    ComposeEntry::new('0', 'a', 'å'),
    ComposeEntry::new('A', 'A', 'Å'),
    ComposeEntry::new('a', 'a', 'å'),
    ComposeEntry::new('A', 'E', 'Æ'),
    ComposeEntry::new('a', 'e', 'æ'),
    ComposeEntry::new(',', 'C', 'Ç'),
    ComposeEntry::new(',', 'c', 'ç'),
    ComposeEntry::new('`', 'E', 'È'),
    ComposeEntry::new('`', 'e', 'è'),
    ComposeEntry::new('\'', 'E', 'É'),
    ComposeEntry::new('\'', 'e', 'é'),
    ComposeEntry::new('^', 'E', 'Ê'),
    ComposeEntry::new('^', 'e', 'ê'),
    ComposeEntry::new('"', 'E', 'Ë'),
    ComposeEntry::new('"', 'e', 'ë'),
    ComposeEntry::new('`', 'I', 'Ì'),
    ComposeEntry::new('`', 'i', 'ì'),
    ComposeEntry::new('\'', 'I', 'Í'),
    ComposeEntry::new('\'', 'i', 'í'),
    ComposeEntry::new('^', 'I', 'Î'),
    ComposeEntry::new('^', 'i', 'î'),
    ComposeEntry::new('"', 'I', 'Ï'),
    ComposeEntry::new('"', 'i', 'ï'),
    ComposeEntry::new('-', 'D', 'Ð'),
    ComposeEntry::new('-', 'd', 'ð'),
    ComposeEntry::new('~', 'N', 'Ñ'),
    ComposeEntry::new('~', 'n', 'ñ'),
    ComposeEntry::new('`', 'O', 'Ò'),
    ComposeEntry::new('`', 'o', 'ò'),
    ComposeEntry::new('\'', 'O', 'Ó'),
    ComposeEntry::new('\'', 'o', 'ó'),
    ComposeEntry::new('^', 'O', 'Ô'),
    ComposeEntry::new('^', 'o', 'ô'),
    ComposeEntry::new('~', 'O', 'Õ'),
    ComposeEntry::new('~', 'o', 'õ'),
    ComposeEntry::new('"', 'O', 'Ö'),
    ComposeEntry::new('"', 'o', 'ö'),
    ComposeEntry::new('/', 'O', 'Ø'),
    ComposeEntry::new('/', 'o', 'ø'),
    ComposeEntry::new('`', 'U', 'Ù'),
    ComposeEntry::new('`', 'u', 'ù'),
    ComposeEntry::new('\'', 'U', 'Ú'),
    ComposeEntry::new('\'', 'u', 'ú'),
    ComposeEntry::new('^', 'U', 'Û'),
    ComposeEntry::new('^', 'u', 'û'),
    ComposeEntry::new('"', 'U', 'Ü'),
    ComposeEntry::new('"', 'u', 'ü'),
    ComposeEntry::new('\'', 'Y', 'Ý'),
    ComposeEntry::new('\'', 'y', 'ý'),
    ComposeEntry::new('T', 'H', 'Þ'),
    ComposeEntry::new('t', 'h', 'þ'),
    ComposeEntry::new('s', 's', 'ß'),
    ComposeEntry::new('"', 'y', 'ÿ'),
    ComposeEntry::new('s', 'z', 'ß'),
    ComposeEntry::new('i', 'j', 'ÿ'),
];

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVE: u32 = '`' as u32;

    #[test]
    fn fallback_hit() {
        assert_eq!(
            compose(&[], FALLBACK_COMPOSE, GRAVE, 'a' as u32),
            Composition::Composed(0xE0)
        );
    }

    #[test]
    fn native_table_wins_over_fallback() {
        let native = [ComposeEntry::new('`', 'a', 'ǻ')];
        assert_eq!(
            compose(&native, FALLBACK_COMPOSE, GRAVE, 'a' as u32),
            Composition::Composed('ǻ' as u32)
        );
    }

    #[test]
    fn first_match_wins_within_a_table() {
        let native = [
            ComposeEntry::new('x', 'y', '1'),
            ComposeEntry::new('x', 'y', '2'),
        ];
        assert_eq!(
            compose(&native, &[], 'x' as u32, 'y' as u32),
            Composition::Composed('1' as u32)
        );
    }

    #[test]
    fn miss_with_space_is_bare_diacritic() {
        assert_eq!(
            compose(&[], FALLBACK_COMPOSE, GRAVE, ' ' as u32),
            Composition::Bare(GRAVE)
        );
    }

    #[test]
    fn miss_emits_both_characters() {
        assert_eq!(
            compose(&[], FALLBACK_COMPOSE, GRAVE, 'z' as u32),
            Composition::Uncombined {
                diacritic: GRAVE,
                base: 'z' as u32
            }
        );
    }

    #[test]
    fn miss_with_same_character_collapses() {
        assert_eq!(
            compose(&[], FALLBACK_COMPOSE, GRAVE, GRAVE),
            Composition::Base(GRAVE)
        );
    }

    #[test]
    fn letter_digraphs() {
        let cases = [
            ('o', 'a', 'å'),
            ('0', 'A', 'Å'),
            ('s', 's', 'ß'),
            ('s', 'z', 'ß'),
            ('i', 'j', 'ÿ'),
            ('T', 'H', 'Þ'),
        ];
        for (d, b, r) in cases {
            assert_eq!(
                compose(&[], FALLBACK_COMPOSE, d as u32, b as u32),
                Composition::Composed(r as u32),
                "{d}{b}"
            );
        }
    }

    #[test]
    fn fallback_has_one_entry_per_pair() {
        for (i, a) in FALLBACK_COMPOSE.iter().enumerate() {
            for b in &FALLBACK_COMPOSE[i + 1..] {
                assert!(
                    !a.matches(b.diacritic, b.base),
                    "duplicate pair {:?}",
                    (a.diacritic, a.base)
                );
            }
        }
    }

    #[test]
    fn entry_serde_is_a_triple() {
        let entry: ComposeEntry = serde_json::from_str("[96, 97, 224]").unwrap();
        assert_eq!(entry, ComposeEntry::new('`', 'a', 'à'));
        assert_eq!(serde_json::to_string(&entry).unwrap(), "[96,97,224]");
    }
}
