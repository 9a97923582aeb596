#![forbid(unsafe_code)]

//! Keyboard layouts and the table bundle the decoder reads from.
//!
//! A [`Layout`] holds one keymap per modifier combination. Keymaps are
//! indexed by [`ModifierMask`] bits and map each of the 128 scancodes to a
//! packed kernel keymap word; a mask with no keymap resolves nothing. The
//! layout also carries the function-key strings and its own composition
//! table.
//!
//! Layouts come from three places:
//!
//! - [`Layout::builder`] for programmatic construction,
//! - [`Layout::us`], a built-in US QWERTY console layout,
//! - [`Layout::from_json_str`] / [`Layout::from_json_reader`] for layouts
//!   exported from a host keymap.
//!
//! # JSON format
//!
//! ```json
//! {
//!   "keymaps": { "0": [512, 27, 49], "1": [512, 27, 33] },
//!   "func": ["\u001b[[A", null],
//!   "accents": [[96, 97, 224]]
//! }
//! ```
//!
//! Keymap rows may be shorter than 128 entries; missing entries are holes.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, Read};

use ahash::AHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::compose::{ComposeEntry, FALLBACK_COMPOSE};
use crate::keysym::{KeyCategory, KeySym, ModifierMask, cur, func, pad, shift, spec};
use crate::symbols::SymbolTable;

/// Scancodes per keymap (the release bit is not part of the scancode).
pub const NR_SCANCODES: usize = 128;

/// Keymaps are indexed by masks below this bound (nine modifier bits).
pub const MAX_KEYMAPS: u16 = 512;

/// Mask selecting the scancode bits of a raw event.
pub const SCANCODE_MASK: u8 = 0x7F;

type Keymap = [u16; NR_SCANCODES];

const HOLE_ROW: Keymap = [KeySym::hole().to_raw(); NR_SCANCODES];

/// Errors raised while loading a layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("keymap index {mask} is out of range (must be below 512)")]
    InvalidMask { mask: u16 },

    #[error("keymap {mask} has {len} entries (at most 128 allowed)")]
    RowTooLong { mask: u16, len: usize },

    #[error("accent entry {index} contains a value that is not a Unicode scalar")]
    InvalidAccent { index: usize },
}

/// A console keyboard layout.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    keymaps: AHashMap<u16, Box<Keymap>>,
    func: Vec<Option<String>>,
    accents: Vec<ComposeEntry>,
}

impl Layout {
    #[must_use]
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// Resolve a scancode under `mask`.
    ///
    /// Returns `None` when the layout has no keymap for `mask`. Only the low
    /// seven bits of `scancode` are used.
    #[must_use]
    pub fn resolve(&self, mask: ModifierMask, scancode: u8) -> Option<KeySym> {
        let keymap = self.keymaps.get(&mask.bits())?;
        let word = keymap[usize::from(scancode & SCANCODE_MASK)];
        Some(KeySym::from_raw(word))
    }

    /// Whether a keymap exists for `mask`.
    #[must_use]
    pub fn has_keymap(&self, mask: ModifierMask) -> bool {
        self.keymaps.contains_key(&mask.bits())
    }

    /// Number of keymaps in the layout.
    #[must_use]
    pub fn keymap_count(&self) -> usize {
        self.keymaps.len()
    }

    /// The string bound to function key `index`.
    #[must_use]
    pub fn func(&self, index: u8) -> Option<&str> {
        self.func.get(usize::from(index))?.as_deref()
    }

    /// The layout's own composition table.
    #[must_use]
    pub fn accents(&self) -> &[ComposeEntry] {
        &self.accents
    }

    /// Parse a layout from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] if the text is not valid JSON or describes an
    /// invalid layout.
    pub fn from_json_str(text: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = serde_json::from_str(text)?;
        file.into_layout()
    }

    /// Read and parse a layout from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] if reading fails or the JSON describes an
    /// invalid layout.
    pub fn from_json_reader(mut reader: impl Read) -> Result<Self, LayoutError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_json_str(&text)
    }

    /// The US QWERTY console layout.
    ///
    /// Provides plain, Shift, AltGr, Control, Alt, Shift+Alt and
    /// Control+Alt keymaps and the kernel's default function-key strings.
    /// The native accent table is empty, so compose sequences use the
    /// fallback table.
    #[must_use]
    pub fn us() -> Self {
        let plain = us_keymap(UsLevel::Plain);
        let shifted = us_keymap(UsLevel::Shift);

        let mut builder = Self::builder()
            .keymap_words(ModifierMask::NONE, plain)
            .keymap_words(ModifierMask::SHIFT, shifted)
            .keymap_words(ModifierMask::ALTGR, plain)
            .keymap_words(ModifierMask::CTRL, us_keymap(UsLevel::Ctrl))
            .keymap_words(ModifierMask::ALT, us_keymap(UsLevel::Alt))
            .keymap_words(
                ModifierMask::SHIFT | ModifierMask::ALT,
                us_keymap(UsLevel::ShiftAlt),
            )
            .keymap_words(
                ModifierMask::CTRL | ModifierMask::ALT,
                us_keymap(UsLevel::CtrlAlt),
            );

        for (index, text) in US_FUNC_STRINGS.iter().enumerate() {
            if let Ok(index) = u8::try_from(index) {
                builder = builder.func(index, *text);
            }
        }
        builder.build()
    }
}

/// Incremental [`Layout`] construction.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    layout: Layout,
}

impl LayoutBuilder {
    /// Ensure a keymap exists for `mask` (new keymaps are all holes).
    #[must_use]
    pub fn keymap(mut self, mask: ModifierMask) -> Self {
        self.row(mask);
        self
    }

    /// Replace the keymap for `mask` with packed keymap words.
    #[must_use]
    pub fn keymap_words(mut self, mask: ModifierMask, words: Keymap) -> Self {
        self.layout.keymaps.insert(mask.bits(), Box::new(words));
        self
    }

    /// Bind `scancode` (low seven bits) under `mask` to `sym`.
    #[must_use]
    pub fn bind(self, mask: ModifierMask, scancode: u8, sym: KeySym) -> Self {
        self.bind_raw(mask, scancode, sym.to_raw())
    }

    /// Bind `scancode` (low seven bits) under `mask` to a packed word.
    #[must_use]
    pub fn bind_raw(mut self, mask: ModifierMask, scancode: u8, word: u16) -> Self {
        self.row(mask)[usize::from(scancode & SCANCODE_MASK)] = word;
        self
    }

    /// Set the string for function key `index`.
    #[must_use]
    pub fn func(mut self, index: u8, text: impl Into<String>) -> Self {
        let index = usize::from(index);
        if self.layout.func.len() <= index {
            self.layout.func.resize(index + 1, None);
        }
        self.layout.func[index] = Some(text.into());
        self
    }

    /// Append an entry to the layout's composition table.
    #[must_use]
    pub fn accent(mut self, entry: ComposeEntry) -> Self {
        self.layout.accents.push(entry);
        self
    }

    #[must_use]
    pub fn build(self) -> Layout {
        self.layout
    }

    fn row(&mut self, mask: ModifierMask) -> &mut Keymap {
        self.layout
            .keymaps
            .entry(mask.bits())
            .or_insert_with(|| Box::new(HOLE_ROW))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutFile {
    keymaps: BTreeMap<u16, Vec<u16>>,
    #[serde(default)]
    func: Vec<Option<String>>,
    #[serde(default)]
    accents: Vec<ComposeEntry>,
}

impl LayoutFile {
    fn into_layout(self) -> Result<Layout, LayoutError> {
        let mut keymaps = AHashMap::with_capacity(self.keymaps.len());
        for (mask, words) in self.keymaps {
            if mask >= MAX_KEYMAPS {
                return Err(LayoutError::InvalidMask { mask });
            }
            if words.len() > NR_SCANCODES {
                return Err(LayoutError::RowTooLong {
                    mask,
                    len: words.len(),
                });
            }
            let mut row = Box::new(HOLE_ROW);
            row[..words.len()].copy_from_slice(&words);
            keymaps.insert(mask, row);
        }

        for (index, entry) in self.accents.iter().enumerate() {
            let valid = [entry.diacritic, entry.base, entry.result]
                .into_iter()
                .all(|cp| char::from_u32(cp).is_some());
            if !valid {
                return Err(LayoutError::InvalidAccent { index });
            }
        }

        Ok(Layout {
            keymaps,
            func: self.func,
            accents: self.accents,
        })
    }
}

/// Everything the decoder reads: the layout, the named-symbol table and the
/// fallback composition table.
///
/// Built once before decoding starts and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct KeyboardTables {
    pub layout: Layout,
    pub symbols: SymbolTable,
    pub fallback: Cow<'static, [ComposeEntry]>,
}

impl KeyboardTables {
    /// Bundle `layout` with the console symbol table and the built-in
    /// fallback compositions.
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            symbols: SymbolTable::linux_console(),
            fallback: Cow::Borrowed(FALLBACK_COMPOSE),
        }
    }

    #[must_use]
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Vec<ComposeEntry>) -> Self {
        self.fallback = Cow::Owned(fallback);
        self
    }
}

impl Default for KeyboardTables {
    fn default() -> Self {
        Self::new(Layout::us())
    }
}

// ── Built-in US layout ───────────────────────────────────────────────────

/// Kernel default strings for F1-F20 and the editing block.
const US_FUNC_STRINGS: [&str; 26] = [
    "\x1b[[A", "\x1b[[B", "\x1b[[C", "\x1b[[D", "\x1b[[E", "\x1b[17~", "\x1b[18~", "\x1b[19~",
    "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[25~", "\x1b[26~", "\x1b[28~",
    "\x1b[29~", "\x1b[31~", "\x1b[32~", "\x1b[33~", "\x1b[34~", "\x1b[1~", "\x1b[2~", "\x1b[3~",
    "\x1b[4~", "\x1b[5~", "\x1b[6~",
];

/// Letter rows: (first scancode, letters).
const US_LETTER_ROWS: [(u8, &[u8]); 3] =
    [(16, b"qwertyuiop"), (30, b"asdfghjkl"), (44, b"zxcvbnm")];

/// Non-letter printable keys: (scancode, plain, shifted).
const US_SYMBOLS: [(u8, u8, u8); 23] = [
    (2, b'1', b'!'),
    (3, b'2', b'@'),
    (4, b'3', b'#'),
    (5, b'4', b'$'),
    (6, b'5', b'%'),
    (7, b'6', b'^'),
    (8, b'7', b'&'),
    (9, b'8', b'*'),
    (10, b'9', b'('),
    (11, b'0', b')'),
    (12, b'-', b'_'),
    (13, b'=', b'+'),
    (26, b'[', b'{'),
    (27, b']', b'}'),
    (39, b';', b':'),
    (40, b'\'', b'"'),
    (41, b'`', b'~'),
    (43, b'\\', b'|'),
    (51, b',', b'<'),
    (52, b'.', b'>'),
    (53, b'/', b'?'),
    (57, b' ', b' '),
    (86, b'<', b'>'),
];

/// Function keys F1-F12 by scancode, as `(scancode, F-index)`.
const US_FKEYS: [(u8, u8); 12] = [
    (59, 0),
    (60, 1),
    (61, 2),
    (62, 3),
    (63, 4),
    (64, 5),
    (65, 6),
    (66, 7),
    (67, 8),
    (68, 9),
    (87, 10),
    (88, 11),
];

/// Keys that are the same at every level.
const US_COMMON: [(u8, KeySym); 40] = [
    (1, KeySym::latin(0x1B)),
    (14, KeySym::latin(0x7F)),
    (15, KeySym::latin(b'\t')),
    (28, KeySym::new(KeyCategory::Spec, spec::ENTER)),
    (29, KeySym::shift(shift::CTRL)),
    (42, KeySym::shift(shift::SHIFT)),
    (54, KeySym::shift(shift::SHIFT)),
    (56, KeySym::shift(shift::ALT)),
    (97, KeySym::shift(shift::CTRL)),
    (100, KeySym::shift(shift::ALTGR)),
    (58, KeySym::new(KeyCategory::Spec, spec::CAPS)),
    (69, KeySym::new(KeyCategory::Spec, spec::NUM)),
    (70, KeySym::new(KeyCategory::Spec, spec::HOLD)),
    (119, KeySym::new(KeyCategory::Spec, spec::BREAK)),
    (55, KeySym::new(KeyCategory::Pad, pad::STAR)),
    (71, KeySym::new(KeyCategory::Pad, pad::P7)),
    (72, KeySym::new(KeyCategory::Pad, pad::P8)),
    (73, KeySym::new(KeyCategory::Pad, pad::P9)),
    (74, KeySym::new(KeyCategory::Pad, pad::MINUS)),
    (75, KeySym::new(KeyCategory::Pad, pad::P4)),
    (76, KeySym::new(KeyCategory::Pad, pad::P5)),
    (77, KeySym::new(KeyCategory::Pad, pad::P6)),
    (78, KeySym::new(KeyCategory::Pad, pad::PLUS)),
    (79, KeySym::new(KeyCategory::Pad, pad::P1)),
    (80, KeySym::new(KeyCategory::Pad, pad::P2)),
    (81, KeySym::new(KeyCategory::Pad, pad::P3)),
    (82, KeySym::new(KeyCategory::Pad, pad::P0)),
    (83, KeySym::new(KeyCategory::Pad, pad::DOT)),
    (96, KeySym::new(KeyCategory::Pad, pad::ENTER)),
    (98, KeySym::new(KeyCategory::Pad, pad::SLASH)),
    (102, KeySym::new(KeyCategory::Fn, func::FIND)),
    (103, KeySym::new(KeyCategory::Cur, cur::UP)),
    (104, KeySym::new(KeyCategory::Fn, func::PGUP)),
    (105, KeySym::new(KeyCategory::Cur, cur::LEFT)),
    (106, KeySym::new(KeyCategory::Cur, cur::RIGHT)),
    (107, KeySym::new(KeyCategory::Fn, func::SELECT)),
    (108, KeySym::new(KeyCategory::Cur, cur::DOWN)),
    (109, KeySym::new(KeyCategory::Fn, func::PGDN)),
    (110, KeySym::new(KeyCategory::Fn, func::INSERT)),
    (111, KeySym::new(KeyCategory::Fn, func::REMOVE)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsLevel {
    Plain,
    Shift,
    Ctrl,
    Alt,
    ShiftAlt,
    CtrlAlt,
}

fn us_keymap(level: UsLevel) -> Keymap {
    let mut row = HOLE_ROW;
    let mut set = |scancode: u8, sym: KeySym| row[usize::from(scancode)] = sym.to_raw();

    for (scancode, sym) in US_COMMON {
        set(scancode, sym);
    }

    for (first, letters) in US_LETTER_ROWS {
        for (scancode, &lower) in (first..).zip(letters) {
            let upper = lower.to_ascii_uppercase();
            let sym = match level {
                UsLevel::Plain => KeySym::letter(lower),
                UsLevel::Shift => KeySym::letter(upper),
                UsLevel::Ctrl => KeySym::latin(lower & 0x1F),
                UsLevel::Alt => KeySym::meta(lower),
                UsLevel::ShiftAlt => KeySym::meta(upper),
                UsLevel::CtrlAlt => KeySym::meta(lower & 0x1F),
            };
            set(scancode, sym);
        }
    }

    for (scancode, plain, shifted) in US_SYMBOLS {
        let sym = match level {
            UsLevel::Plain | UsLevel::Ctrl => KeySym::latin(plain),
            UsLevel::Shift => KeySym::latin(shifted),
            UsLevel::Alt | UsLevel::CtrlAlt => KeySym::meta(plain),
            UsLevel::ShiftAlt => KeySym::meta(shifted),
        };
        set(scancode, sym);
    }

    for (scancode, index) in US_FKEYS {
        let sym = match level {
            UsLevel::Plain | UsLevel::Ctrl => KeySym::new(KeyCategory::Fn, func::F1 + index),
            // Shift+F1..F10 are F11..F20.
            UsLevel::Shift if index < 10 => KeySym::new(KeyCategory::Fn, func::F1 + index + 10),
            UsLevel::Shift => KeySym::new(KeyCategory::Fn, func::F1 + index),
            UsLevel::Alt | UsLevel::ShiftAlt | UsLevel::CtrlAlt => {
                KeySym::new(KeyCategory::Cons, index)
            }
        };
        set(scancode, sym);
    }

    match level {
        UsLevel::Shift => {
            set(104, KeySym::new(KeyCategory::Spec, spec::SCROLLBACK));
            set(109, KeySym::new(KeyCategory::Spec, spec::SCROLLFORW));
        }
        UsLevel::Ctrl => {
            set(26, KeySym::latin(0x1B));
            set(43, KeySym::latin(0x1C));
            set(27, KeySym::latin(0x1D));
            set(57, KeySym::latin(0x00));
        }
        UsLevel::Alt => {
            set(105, KeySym::new(KeyCategory::Spec, spec::DECRCONSOLE));
            set(106, KeySym::new(KeyCategory::Spec, spec::INCRCONSOLE));
        }
        UsLevel::CtrlAlt => {
            set(111, KeySym::new(KeyCategory::Spec, spec::BOOT));
        }
        UsLevel::Plain | UsLevel::ShiftAlt => {}
    }

    row
}
