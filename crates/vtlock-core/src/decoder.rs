#![forbid(unsafe_code)]

//! Keystroke decoder for the console's medium-raw keyboard protocol.
//!
//! Every raw event is one byte: bit 7 is set on release, bits 0-6 carry the
//! scancode. The decoder tracks held modifiers and pending dead keys, and
//! turns each event into an [`Outcome`]: either some output (possibly
//! nothing) or a request to end the session.
//!
//! # Event handling
//!
//! 1. The scancode is resolved without modifiers. A modifier key updates the
//!    modifier mask on press and release; nothing else happens.
//! 2. Releases of any other key are ignored.
//! 3. The scancode is resolved under the held modifiers. A modifier
//!    combination the layout has no keymap for produces nothing.
//! 4. The resolved key is dispatched on its [`KeyCategory`].
//!
//! Console-switch, lock and braille keys are inert. A lock must never let a
//! console switch through.
//!
//! # Dead keys
//!
//! A dead key (or the compose key followed by any Latin key) leaves a
//! pending diacritic. The next Latin key is combined with it through the
//! layout's accent table, then the fallback table. A second dead key before
//! the base replaces the pending diacritic. Meta keys leave it alone.
//!
//! # Example
//!
//! ```
//! use vtlock_core::{Decoder, DecoderConfig, KeyboardTables, Layout, Outcome, Token};
//!
//! let tables = KeyboardTables::new(Layout::us());
//! let mut decoder = Decoder::new(&tables, DecoderConfig::default());
//!
//! // Press and release 'a'.
//! let Outcome::Emit(out) = decoder.handle_event(30) else { unreachable!() };
//! assert_eq!(out.tokens().collect::<Vec<_>>(), [Token::CodePoint('a' as i32)]);
//! assert!(decoder.handle_event(30 | 0x80).is_empty());
//!
//! // The abort key ends the session.
//! assert_eq!(decoder.handle_event(16), Outcome::Abort);
//! ```

use crate::compose::{Composition, compose};
use crate::keysym::{KeyCategory, KeySym, ModifierMask, spec};
use crate::layout::{KeyboardTables, SCANCODE_MASK};
use crate::{debug, trace};

/// Bit set in a raw event when the key is released.
pub const RELEASE_BIT: u8 = 0x80;

/// Default abort character.
pub const DEFAULT_ABORT_KEY: u8 = b'q';

const ESC: i32 = 0x1B;

/// One unit of decoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A Unicode code point, written as UTF-8.
    CodePoint(i32),
    /// A fixed string from the layout or symbol table, written verbatim.
    Text(&'a str),
}

/// The output of one raw event: zero, one or two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Emission<'a> {
    first: Option<Token<'a>>,
    second: Option<Token<'a>>,
}

impl<'a> Emission<'a> {
    /// Nothing to write.
    pub const NONE: Self = Self {
        first: None,
        second: None,
    };

    #[must_use]
    pub const fn one(token: Token<'a>) -> Self {
        Self {
            first: Some(token),
            second: None,
        }
    }

    #[must_use]
    pub const fn two(first: Token<'a>, second: Token<'a>) -> Self {
        Self {
            first: Some(first),
            second: Some(second),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.first.is_some()) + usize::from(self.second.is_some())
    }

    /// Tokens in the order they must be written.
    pub fn tokens(&self) -> impl Iterator<Item = Token<'a>> + use<'a> {
        self.first.into_iter().chain(self.second)
    }
}

/// What the caller should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    /// Write the emission (it may be empty) and keep reading.
    Emit(Emission<'a>),
    /// The abort key was pressed. Nothing is written.
    Abort,
}

impl<'a> Outcome<'a> {
    const NOTHING: Self = Self::Emit(Emission::NONE);

    /// Whether this outcome neither writes nor aborts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Emit(emission) if emission.is_empty())
    }

    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Latin-1 value that ends the session, or `None` to never abort.
    pub abort_key: Option<u8>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            abort_key: Some(DEFAULT_ABORT_KEY),
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn with_abort_key(mut self, abort_key: Option<u8>) -> Self {
        self.abort_key = abort_key;
        self
    }

    /// Load config from environment variables.
    ///
    /// Reads `VTLOCK_ABORT_KEY`: a single Latin-1 character, or `none` to
    /// disable the abort key. Anything else keeps the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load config using a custom environment lookup (for tests).
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(val) = get_env("VTLOCK_ABORT_KEY") {
            match parse_abort_key(&val) {
                Some(abort_key) => config.abort_key = abort_key,
                None => debug!(len = val.len(), "ignoring invalid VTLOCK_ABORT_KEY"),
            }
        }
        config.validated()
    }

    /// Drop an abort key that no Latin key can produce.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.abort_key == Some(0) {
            self.abort_key = None;
        }
        self
    }
}

fn parse_abort_key(val: &str) -> Option<Option<u8>> {
    let val = val.trim();
    if val.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    let mut chars = val.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    u8::try_from(u32::from(ch)).ok().map(Some)
}

/// Decoder state for one session.
///
/// The tables are borrowed for the decoder's lifetime; tokens returned by
/// [`Decoder::handle_event`] may borrow strings from them.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    tables: &'a KeyboardTables,
    config: DecoderConfig,
    modifiers: ModifierMask,
    /// Diacritic waiting for a base character (0 = none).
    pending_diacritic: u32,
    /// The compose key was pressed; the next Latin key is a diacritic.
    compose_armed: bool,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(tables: &'a KeyboardTables, config: DecoderConfig) -> Self {
        Self {
            tables,
            config,
            modifiers: ModifierMask::NONE,
            pending_diacritic: 0,
            compose_armed: false,
        }
    }

    /// Currently held modifiers.
    #[must_use]
    pub fn modifiers(&self) -> ModifierMask {
        self.modifiers
    }

    /// The pending diacritic, if a dead key is waiting for its base.
    #[must_use]
    pub fn pending_diacritic(&self) -> Option<u32> {
        (self.pending_diacritic != 0).then_some(self.pending_diacritic)
    }

    /// Whether the compose key is waiting for its diacritic.
    #[must_use]
    pub fn compose_armed(&self) -> bool {
        self.compose_armed
    }

    #[must_use]
    pub fn config(&self) -> DecoderConfig {
        self.config
    }

    /// Forget held modifiers and pending dead keys.
    pub fn reset(&mut self) {
        self.modifiers = ModifierMask::NONE;
        self.pending_diacritic = 0;
        self.compose_armed = false;
    }

    /// Decode one raw event.
    ///
    /// Never fails: unmapped input produces an empty emission.
    pub fn handle_event(&mut self, raw: u8) -> Outcome<'a> {
        let released = raw & RELEASE_BIT != 0;
        let scancode = raw & SCANCODE_MASK;
        let layout = &self.tables.layout;

        if let Some(KeySym {
            category: KeyCategory::Shift,
            value,
        }) = layout.resolve(ModifierMask::NONE, scancode)
        {
            self.update_modifier(value, released);
            return Outcome::NOTHING;
        }

        if released {
            return Outcome::NOTHING;
        }

        let Some(sym) = layout.resolve(self.modifiers, scancode) else {
            trace!(
                scancode,
                mask = self.modifiers.bits(),
                "no keymap for modifiers"
            );
            return Outcome::NOTHING;
        };

        self.dispatch(sym)
    }

    fn update_modifier(&mut self, value: u8, released: bool) {
        let Some(bit) = ModifierMask::for_modifier(value) else {
            debug!(value, "modifier value does not fit the mask");
            return;
        };
        self.modifiers.set(bit, !released);
        trace!(mask = self.modifiers.bits(), released, "modifiers changed");
    }

    fn dispatch(&mut self, sym: KeySym) -> Outcome<'a> {
        let tables = self.tables;
        let KeySym { category, value } = sym;

        match category {
            KeyCategory::Letter | KeyCategory::Latin => self.text(value),
            KeyCategory::Meta => Outcome::Emit(Emission::two(
                Token::CodePoint(ESC),
                Token::CodePoint(i32::from(value)),
            )),
            KeyCategory::Fn => fixed(tables.layout.func(value)),
            KeyCategory::Dead => {
                self.compose_armed = false;
                match tables.symbols.get(KeyCategory::Dead, value) {
                    Some(marker) if !marker.is_empty() => {
                        self.pending_diacritic = u32::from(marker.as_bytes()[0]);
                    }
                    _ => debug!(value, "dead key has no diacritic"),
                }
                Outcome::NOTHING
            }
            KeyCategory::Dead2 => {
                self.compose_armed = false;
                self.pending_diacritic = u32::from(value);
                Outcome::NOTHING
            }
            KeyCategory::Spec | KeyCategory::Pad | KeyCategory::Cur | KeyCategory::Ascii => {
                if let Some(text) = tables.symbols.get(category, value) {
                    return fixed(Some(text));
                }
                if category == KeyCategory::Spec && value == spec::COMPOSE {
                    self.compose_armed = true;
                }
                Outcome::NOTHING
            }
            KeyCategory::Shift
            | KeyCategory::Cons
            | KeyCategory::Lock
            | KeyCategory::Slock
            | KeyCategory::Brl
            | KeyCategory::Unknown(_) => {
                trace!(kind = ?category, "inert key");
                Outcome::NOTHING
            }
        }
    }

    fn text(&mut self, value: u8) -> Outcome<'a> {
        if self.config.abort_key == Some(value) {
            debug!("abort key pressed");
            return Outcome::Abort;
        }

        if self.compose_armed {
            self.compose_armed = false;
            self.pending_diacritic = u32::from(value);
            return Outcome::NOTHING;
        }

        let base = u32::from(value);
        if self.pending_diacritic == 0 {
            return Outcome::Emit(Emission::one(code_point(base)));
        }

        let diacritic = std::mem::take(&mut self.pending_diacritic);
        let emission = match compose(
            self.tables.layout.accents(),
            &self.tables.fallback,
            diacritic,
            base,
        ) {
            Composition::Composed(result)
            | Composition::Bare(result)
            | Composition::Base(result) => Emission::one(code_point(result)),
            Composition::Uncombined { diacritic, base } => {
                Emission::two(code_point(diacritic), code_point(base))
            }
        };
        Outcome::Emit(emission)
    }
}

fn fixed(text: Option<&str>) -> Outcome<'_> {
    match text {
        Some(text) if !text.is_empty() => Outcome::Emit(Emission::one(Token::Text(text))),
        _ => Outcome::NOTHING,
    }
}

/// Composition results are Unicode scalars; out-of-range values encode to
/// nothing.
fn code_point(cp: u32) -> Token<'static> {
    Token::CodePoint(i32::try_from(cp).unwrap_or(-1))
}
