#![forbid(unsafe_code)]

//! UTF-8 encoding of decoded keystrokes and the output side of the decoder.

use std::io::{self, Write};

use crate::decoder::{Emission, Token};
use crate::trace;

/// The UTF-8 bytes of one code point (at most four).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Utf8Bytes {
    buf: [u8; 4],
    len: u8,
}

impl Utf8Bytes {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..usize::from(self.len)]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Utf8Bytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Encode a code point as UTF-8.
///
/// Negative values, surrogates and values above U+10FFFF encode to zero
/// bytes.
#[must_use]
pub fn encode_utf8(code_point: i32) -> Utf8Bytes {
    let mut out = Utf8Bytes::default();
    let Some(ch) = u32::try_from(code_point).ok().and_then(char::from_u32) else {
        return out;
    };
    let len = ch.encode_utf8(&mut out.buf).len();
    // len <= 4
    out.len = len as u8;
    out
}

/// Writes emissions to a byte sink.
///
/// Each token is written with `write_all` (interrupted and partial writes
/// are retried) and the sink is flushed once per emission.
#[derive(Debug)]
pub struct OutputEncoder<W: Write> {
    sink: W,
    bytes_written: u64,
}

impl<W: Write> OutputEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            bytes_written: 0,
        }
    }

    /// Write every token of `emission`, in order, then flush.
    ///
    /// An empty emission writes nothing and does not flush.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable sink error. Tokens after the failing
    /// one are not written.
    pub fn emit(&mut self, emission: &Emission<'_>) -> io::Result<()> {
        if emission.is_empty() {
            return Ok(());
        }
        for token in emission.tokens() {
            match token {
                Token::CodePoint(cp) => self.write(encode_utf8(cp).as_bytes())?,
                Token::Text(text) => self.write(text.as_bytes())?,
            }
        }
        self.sink.flush()
    }

    /// Total bytes accepted by the sink so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.sink.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        trace!(len = bytes.len(), "token written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_one_byte() {
        assert_eq!(encode_utf8(0x41).as_bytes(), b"A");
        assert_eq!(encode_utf8(0).as_bytes(), &[0]);
        assert_eq!(encode_utf8(0x7F).as_bytes(), &[0x7F]);
    }

    #[test]
    fn multi_byte_boundaries() {
        assert_eq!(encode_utf8(0x80).as_bytes(), &[0xC2, 0x80]);
        assert_eq!(encode_utf8(0xE0).as_bytes(), "à".as_bytes());
        assert_eq!(encode_utf8(0x7FF).len(), 2);
        assert_eq!(encode_utf8(0x800).len(), 3);
        assert_eq!(encode_utf8(0xFFFF).len(), 3);
        assert_eq!(encode_utf8(0x1_0000).len(), 4);
        assert_eq!(encode_utf8(0x10_FFFF).as_bytes(), &[0xF4, 0x8F, 0xBF, 0xBF]);
    }

    #[test]
    fn invalid_code_points_encode_to_nothing() {
        assert!(encode_utf8(-1).is_empty());
        assert!(encode_utf8(i32::MIN).is_empty());
        assert!(encode_utf8(0xD800).is_empty());
        assert!(encode_utf8(0xDFFF).is_empty());
        assert!(encode_utf8(0x11_0000).is_empty());
    }

    #[test]
    fn round_trip_over_all_scalars() {
        for cp in (0..=0x10_FFFF).filter(|cp| !(0xD800..=0xDFFF).contains(cp)) {
            let bytes = encode_utf8(cp);
            assert!(bytes.len() <= 4);
            let text = std::str::from_utf8(bytes.as_bytes()).unwrap();
            let mut chars = text.chars();
            assert_eq!(chars.next().map(|c| c as i32), Some(cp));
            assert_eq!(chars.next(), None);
        }
    }

    #[test]
    fn emit_writes_tokens_in_order() {
        let mut encoder = OutputEncoder::new(Vec::new());
        encoder
            .emit(&Emission::two(Token::CodePoint('`' as i32), Token::CodePoint('z' as i32)))
            .unwrap();
        encoder.emit(&Emission::one(Token::Text("\x1b[A"))).unwrap();
        encoder.emit(&Emission::NONE).unwrap();
        assert_eq!(encoder.bytes_written(), 5);
        assert_eq!(encoder.into_inner(), b"`z\x1b[A");
    }

    struct FailingSink {
        accepted: Vec<u8>,
        fail_after: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted.len() >= self.fail_after {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            // One byte at a time exercises the partial-write retry.
            self.accepted.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut encoder = OutputEncoder::new(FailingSink {
            accepted: Vec::new(),
            fail_after: usize::MAX,
        });
        encoder.emit(&Emission::one(Token::CodePoint(0x20AC))).unwrap();
        assert_eq!(encoder.get_ref().accepted, "€".as_bytes());
    }

    #[test]
    fn sink_error_abandons_rest_of_emission() {
        let mut encoder = OutputEncoder::new(FailingSink {
            accepted: Vec::new(),
            fail_after: 1,
        });
        let err = encoder
            .emit(&Emission::two(Token::CodePoint('a' as i32), Token::CodePoint('b' as i32)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(encoder.get_ref().accepted, b"a");
        assert_eq!(encoder.bytes_written(), 1);
    }

    struct InterruptOnce {
        interrupted: bool,
        out: Vec<u8>,
    }

    impl Write for InterruptOnce {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn interrupted_writes_are_retried() {
        let mut encoder = OutputEncoder::new(InterruptOnce {
            interrupted: false,
            out: Vec::new(),
        });
        encoder.emit(&Emission::one(Token::Text("\n"))).unwrap();
        assert_eq!(encoder.into_inner().out, b"\n");
    }
}
