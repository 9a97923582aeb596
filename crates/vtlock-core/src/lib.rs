#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]

//! Core: medium-raw keyboard decoding for console session locks.
//!
//! # Role in vtlock
//! `vtlock-core` turns the console's uninterpreted scancode stream into text.
//! It knows nothing about terminals: raw events come in through
//! [`RawEventSource`], decoded bytes go out through any `std::io::Write`.
//! `vtlock-tty` owns the console and plugs into both ends.
//!
//! # Primary responsibilities
//! - **Decoder**: modifier tracking, dead keys, compose, abort detection.
//! - **Layouts**: keymaps per modifier combination, built in or from JSON.
//! - **Composition**: layout accent tables with a Latin-1 fallback.
//! - **Output**: UTF-8 encoding and retried, flushed writes.
//!
//! # Example
//!
//! ```
//! use vtlock_core::{
//!     ByteSource, Decoder, DecoderConfig, KeyboardTables, Layout, OutputEncoder, SessionEnd,
//!     pump,
//! };
//!
//! let tables = KeyboardTables::new(Layout::us());
//! let mut decoder = Decoder::new(&tables, DecoderConfig::default());
//! let mut out = OutputEncoder::new(Vec::new());
//!
//! // h, i, Enter, q
//! let end = pump(&mut decoder, ByteSource::new([35, 23, 28, 16]), &mut out)?;
//! assert_eq!(end, SessionEnd::Aborted);
//! assert_eq!(out.into_inner(), b"hi\n");
//! # Ok::<(), vtlock_core::PumpError>(())
//! ```

pub mod compose;
pub mod decoder;
pub mod encode;
pub mod keysym;
pub mod layout;
pub mod logging;
pub mod pump;
pub mod symbols;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, debug_span, error, info, trace, warn};

pub use compose::{ComposeEntry, Composition, FALLBACK_COMPOSE, compose};
pub use decoder::{Decoder, DecoderConfig, Emission, Outcome, Token};
pub use encode::{OutputEncoder, Utf8Bytes, encode_utf8};
pub use keysym::{KeyCategory, KeySym, ModifierMask};
pub use layout::{KeyboardTables, Layout, LayoutBuilder, LayoutError};
pub use pump::{ByteSource, PumpError, RawEventSource, SessionEnd, pump};
pub use symbols::SymbolTable;
