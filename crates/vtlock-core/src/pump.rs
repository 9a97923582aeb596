#![forbid(unsafe_code)]

//! The read-decode-write loop.
//!
//! One raw event is read, decoded and written before the next is read.
//! The only place the loop waits is [`RawEventSource::read_raw`].

use std::io::{self, Write};

use thiserror::Error;

use crate::decoder::{Decoder, Outcome};
use crate::encode::OutputEncoder;
use crate::{debug, debug_span};

/// A source of medium-raw keyboard events.
pub trait RawEventSource {
    /// Read the next raw event.
    ///
    /// Returns `Ok(None)` when the source is exhausted or a bounded wait
    /// elapsed without input.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if reading fails.
    fn read_raw(&mut self) -> io::Result<Option<u8>>;
}

impl<S: RawEventSource + ?Sized> RawEventSource for &mut S {
    fn read_raw(&mut self) -> io::Result<Option<u8>> {
        (**self).read_raw()
    }
}

/// A [`RawEventSource`] over an in-memory iterator of raw bytes.
#[derive(Debug, Clone)]
pub struct ByteSource<I> {
    events: I,
}

impl<I: Iterator<Item = u8>> ByteSource<I> {
    pub fn new(events: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

impl<I: Iterator<Item = u8>> RawEventSource for ByteSource<I> {
    fn read_raw(&mut self) -> io::Result<Option<u8>> {
        Ok(self.events.next())
    }
}

/// How a [`pump`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The abort key was pressed.
    Aborted,
    /// The source returned no event.
    SourceExhausted,
}

/// Failures surfaced by [`pump`].
///
/// The decoder is left as it was before the failing event was read (for
/// source errors) or after it was decoded (for sink errors), so the caller
/// may call [`pump`] again to resume.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("failed to read keyboard event: {0}")]
    Source(#[source] io::Error),

    #[error("failed to write decoded output: {0}")]
    Sink(#[source] io::Error),
}

/// Feed events from `source` through `decoder` into `encoder` until the
/// abort key is pressed or the source runs dry.
///
/// # Errors
///
/// Returns [`PumpError::Source`] if reading fails and [`PumpError::Sink`]
/// if writing an emission fails.
pub fn pump<S, W>(
    decoder: &mut Decoder<'_>,
    mut source: S,
    encoder: &mut OutputEncoder<W>,
) -> Result<SessionEnd, PumpError>
where
    S: RawEventSource,
    W: Write,
{
    let span = debug_span!("pump");
    let _guard = span.enter();

    let mut _events: u64 = 0;
    loop {
        let Some(raw) = source.read_raw().map_err(PumpError::Source)? else {
            debug!(events = _events, "event source exhausted");
            return Ok(SessionEnd::SourceExhausted);
        };
        _events += 1;

        match decoder.handle_event(raw) {
            Outcome::Emit(emission) => encoder.emit(&emission).map_err(PumpError::Sink)?,
            Outcome::Abort => {
                debug!(events = _events, "session aborted");
                return Ok(SessionEnd::Aborted);
            }
        }
    }
}
