#![forbid(unsafe_code)]

//! Resolved key symbols and the modifier mask.
//!
//! The Linux console stores every keymap entry as a packed 16-bit word:
//! the key type in bits 8-11, the value in bits 0-7, and (for entries
//! produced by `loadkeys`) a `0xF` marker nibble on top. [`KeySym::from_raw`]
//! unpacks a word exactly once, at the layout boundary; everything past
//! that point matches on [`KeyCategory`].

use bitflags::bitflags;

/// Mask applied to keymap words before they are classified.
pub const KEYSYM_WORD_MASK: u16 = 0x0FFF;

/// Key type (`KT_*` in `<linux/keyboard.h>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    /// Latin-1 symbol, unaffected by caps lock (`KT_LATIN`).
    Latin,
    /// Function key, value indexes the layout's string table (`KT_FN`).
    Fn,
    /// Special key such as Enter or Compose (`KT_SPEC`).
    Spec,
    /// Keypad key (`KT_PAD`).
    Pad,
    /// Layout-native dead key (`KT_DEAD`).
    Dead,
    /// Console switch (`KT_CONS`).
    Cons,
    /// Cursor/arrow key (`KT_CUR`).
    Cur,
    /// Modifier key (`KT_SHIFT`).
    Shift,
    /// Latin-1 symbol with the meta bit (`KT_META`).
    Meta,
    /// Alt+keypad code entry (`KT_ASCII`).
    Ascii,
    /// Modifier lock toggle (`KT_LOCK`).
    Lock,
    /// Latin-1 letter, affected by caps lock (`KT_LETTER`).
    Letter,
    /// Sticky modifier (`KT_SLOCK`).
    Slock,
    /// Table-assisted dead key (`KT_DEAD2`).
    Dead2,
    /// Braille (`KT_BRL`).
    Brl,
    /// A type nibble the kernel does not assign.
    Unknown(u8),
}

impl KeyCategory {
    /// Classify a kernel key type nibble.
    #[must_use]
    pub const fn from_type(kt: u8) -> Self {
        match kt {
            0 => Self::Latin,
            1 => Self::Fn,
            2 => Self::Spec,
            3 => Self::Pad,
            4 => Self::Dead,
            5 => Self::Cons,
            6 => Self::Cur,
            7 => Self::Shift,
            8 => Self::Meta,
            9 => Self::Ascii,
            10 => Self::Lock,
            11 => Self::Letter,
            12 => Self::Slock,
            13 => Self::Dead2,
            14 => Self::Brl,
            other => Self::Unknown(other),
        }
    }

    /// The kernel key type nibble for this category.
    #[must_use]
    pub const fn kernel_type(self) -> u8 {
        match self {
            Self::Latin => 0,
            Self::Fn => 1,
            Self::Spec => 2,
            Self::Pad => 3,
            Self::Dead => 4,
            Self::Cons => 5,
            Self::Cur => 6,
            Self::Shift => 7,
            Self::Meta => 8,
            Self::Ascii => 9,
            Self::Lock => 10,
            Self::Letter => 11,
            Self::Slock => 12,
            Self::Dead2 => 13,
            Self::Brl => 14,
            Self::Unknown(kt) => kt & 0x0F,
        }
    }
}

/// A key resolved through a layout: category plus category-specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySym {
    pub category: KeyCategory,
    pub value: u8,
}

impl KeySym {
    #[must_use]
    pub const fn new(category: KeyCategory, value: u8) -> Self {
        Self { category, value }
    }

    /// Unpack a keymap word, discarding the upper four bits.
    #[must_use]
    pub const fn from_raw(word: u16) -> Self {
        let word = word & KEYSYM_WORD_MASK;
        Self {
            category: KeyCategory::from_type((word >> 8) as u8),
            value: (word & 0xFF) as u8,
        }
    }

    /// Pack into a keymap word (without the `loadkeys` marker nibble).
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        ((self.category.kernel_type() as u16) << 8) | self.value as u16
    }

    /// A caps-lock sensitive letter.
    #[must_use]
    pub const fn letter(c: u8) -> Self {
        Self::new(KeyCategory::Letter, c)
    }

    /// A Latin-1 symbol.
    #[must_use]
    pub const fn latin(c: u8) -> Self {
        Self::new(KeyCategory::Latin, c)
    }

    /// A meta-shifted Latin-1 symbol.
    #[must_use]
    pub const fn meta(c: u8) -> Self {
        Self::new(KeyCategory::Meta, c)
    }

    /// A modifier key.
    #[must_use]
    pub const fn shift(modifier: u8) -> Self {
        Self::new(KeyCategory::Shift, modifier)
    }

    /// The hole: a scancode with nothing bound to it.
    #[must_use]
    pub const fn hole() -> Self {
        Self::new(KeyCategory::Spec, spec::HOLE)
    }

    /// Whether this key is a Latin-1 letter or symbol.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self.category, KeyCategory::Latin | KeyCategory::Letter)
    }
}

/// Values for [`KeyCategory::Spec`].
pub mod spec {
    pub const HOLE: u8 = 0;
    pub const ENTER: u8 = 1;
    pub const SH_REGS: u8 = 2;
    pub const SH_MEM: u8 = 3;
    pub const SH_STAT: u8 = 4;
    pub const BREAK: u8 = 5;
    pub const CONS: u8 = 6;
    pub const CAPS: u8 = 7;
    pub const NUM: u8 = 8;
    pub const HOLD: u8 = 9;
    pub const SCROLLFORW: u8 = 10;
    pub const SCROLLBACK: u8 = 11;
    pub const BOOT: u8 = 12;
    pub const CAPSON: u8 = 13;
    pub const COMPOSE: u8 = 14;
    pub const SAK: u8 = 15;
    pub const DECRCONSOLE: u8 = 16;
    pub const INCRCONSOLE: u8 = 17;
    pub const SPAWNCONSOLE: u8 = 18;
    pub const BARENUMLOCK: u8 = 19;
    pub const ALLOCATED: u8 = 126;
    pub const NOSUCHMAP: u8 = 127;
}

/// Values for [`KeyCategory::Pad`].
pub mod pad {
    pub const P0: u8 = 0;
    pub const P1: u8 = 1;
    pub const P2: u8 = 2;
    pub const P3: u8 = 3;
    pub const P4: u8 = 4;
    pub const P5: u8 = 5;
    pub const P6: u8 = 6;
    pub const P7: u8 = 7;
    pub const P8: u8 = 8;
    pub const P9: u8 = 9;
    pub const PLUS: u8 = 10;
    pub const MINUS: u8 = 11;
    pub const STAR: u8 = 12;
    pub const SLASH: u8 = 13;
    pub const ENTER: u8 = 14;
    pub const COMMA: u8 = 15;
    pub const DOT: u8 = 16;
    pub const PLUSMINUS: u8 = 17;
    pub const PARENL: u8 = 18;
    pub const PARENR: u8 = 19;
}

/// Values for [`KeyCategory::Dead`].
pub mod dead {
    pub const GRAVE: u8 = 0;
    pub const ACUTE: u8 = 1;
    pub const CIRCUMFLEX: u8 = 2;
    pub const TILDE: u8 = 3;
    pub const DIAERESIS: u8 = 4;
    pub const CEDILLA: u8 = 5;
}

/// Values for [`KeyCategory::Cur`].
pub mod cur {
    pub const DOWN: u8 = 0;
    pub const LEFT: u8 = 1;
    pub const RIGHT: u8 = 2;
    pub const UP: u8 = 3;
}

/// Values for [`KeyCategory::Shift`] (the `KG_*` modifier indices).
pub mod shift {
    pub const SHIFT: u8 = 0;
    pub const ALTGR: u8 = 1;
    pub const CTRL: u8 = 2;
    pub const ALT: u8 = 3;
    pub const SHIFTL: u8 = 4;
    pub const SHIFTR: u8 = 5;
    pub const CTRLL: u8 = 6;
    pub const CTRLR: u8 = 7;
    pub const CAPSSHIFT: u8 = 8;
}

/// Values for [`KeyCategory::Fn`] that have names in the kernel headers.
pub mod func {
    /// `F1`; `F1 + n` for `n < 20`.
    pub const F1: u8 = 0;
    pub const FIND: u8 = 20;
    pub const INSERT: u8 = 21;
    pub const REMOVE: u8 = 22;
    pub const SELECT: u8 = 23;
    pub const PGUP: u8 = 24;
    pub const PGDN: u8 = 25;
}

bitflags! {
    /// Currently held modifiers.
    ///
    /// Bit `i` is set while the modifier key whose [`KeyCategory::Shift`]
    /// value is `i` is held down. The mask doubles as the index of the
    /// layout keymap used to resolve non-modifier keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierMask: u16 {
        const SHIFT = 1 << shift::SHIFT;
        const ALTGR = 1 << shift::ALTGR;
        const CTRL = 1 << shift::CTRL;
        const ALT = 1 << shift::ALT;
        const SHIFTL = 1 << shift::SHIFTL;
        const SHIFTR = 1 << shift::SHIFTR;
        const CTRLL = 1 << shift::CTRLL;
        const CTRLR = 1 << shift::CTRLR;
        const CAPSSHIFT = 1 << shift::CAPSSHIFT;
    }
}

impl ModifierMask {
    /// No modifiers held.
    pub const NONE: Self = Self::empty();

    /// The mask bit for a modifier value, or `None` if it cannot be
    /// represented.
    #[must_use]
    pub const fn for_modifier(modifier: u8) -> Option<Self> {
        if (modifier as u32) < u16::BITS {
            Some(Self::from_bits_retain(1 << modifier))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_discards_marker_nibble() {
        // `loadkeys` writes letters as 0xFB61.
        let sym = KeySym::from_raw(0xFB61);
        assert_eq!(sym, KeySym::letter(b'a'));
    }

    #[test]
    fn from_raw_classifies_every_type() {
        for kt in 0u8..16 {
            let sym = KeySym::from_raw(u16::from(kt) << 8 | 0x42);
            assert_eq!(sym.category.kernel_type(), kt);
            assert_eq!(sym.value, 0x42);
        }
        assert_eq!(
            KeySym::from_raw(0x0F00).category,
            KeyCategory::Unknown(15)
        );
    }

    #[test]
    fn to_raw_round_trips() {
        let sym = KeySym::new(KeyCategory::Dead2, b'^');
        assert_eq!(KeySym::from_raw(sym.to_raw()), sym);
        assert_eq!(KeySym::hole().to_raw(), 0x0200);
    }

    #[test]
    fn is_text_only_for_letters_and_latin() {
        assert!(KeySym::letter(b'x').is_text());
        assert!(KeySym::latin(b'1').is_text());
        assert!(!KeySym::meta(b'x').is_text());
        assert!(!KeySym::shift(shift::CTRL).is_text());
    }

    #[test]
    fn modifier_bits_match_kernel_indices() {
        assert_eq!(ModifierMask::SHIFT.bits(), 1);
        assert_eq!(ModifierMask::ALTGR.bits(), 2);
        assert_eq!(ModifierMask::CTRL.bits(), 4);
        assert_eq!(ModifierMask::ALT.bits(), 8);
        assert_eq!(ModifierMask::CAPSSHIFT.bits(), 256);
    }

    #[test]
    fn for_modifier_rejects_unrepresentable_values() {
        assert_eq!(
            ModifierMask::for_modifier(shift::CTRLR),
            Some(ModifierMask::CTRLR)
        );
        assert_eq!(ModifierMask::for_modifier(15).map(|m| m.bits()), Some(0x8000));
        assert_eq!(ModifierMask::for_modifier(16), None);
        assert_eq!(ModifierMask::for_modifier(255), None);
    }
}
