#![allow(unsafe_code)]

//! Console keyboard mode (`KDGKBMODE` / `KDSKBMODE`).
//!
//! Only Linux virtual consoles answer these ioctls; on a pseudo-terminal
//! they fail with `ENOTTY`.

use std::io;
use std::os::fd::{AsFd, AsRawFd};

use nix::libc::c_int;

const KDGKBMODE: u32 = 0x4B44;
const KDSKBMODE: u32 = 0x4B45;

nix::ioctl_read_bad!(kdgkbmode, KDGKBMODE, c_int);
nix::ioctl_write_int_bad!(kdskbmode, KDSKBMODE);

/// Keyboard modes from `<linux/kd.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardMode {
    /// Scancodes as the hardware sends them (`K_RAW`).
    Raw,
    /// Translated through the keymap (`K_XLATE`).
    Xlate,
    /// One byte per key event, release in bit 7 (`K_MEDIUMRAW`).
    MediumRaw,
    /// Translated, UTF-8 output (`K_UNICODE`).
    Unicode,
    /// No keyboard input (`K_OFF`).
    Off,
    /// A mode this crate does not know; restored as-is.
    Other(c_int),
}

impl KeyboardMode {
    #[must_use]
    pub const fn from_raw(mode: c_int) -> Self {
        match mode {
            0 => Self::Raw,
            1 => Self::Xlate,
            2 => Self::MediumRaw,
            3 => Self::Unicode,
            4 => Self::Off,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> c_int {
        match self {
            Self::Raw => 0,
            Self::Xlate => 1,
            Self::MediumRaw => 2,
            Self::Unicode => 3,
            Self::Off => 4,
            Self::Other(mode) => mode,
        }
    }
}

/// Read the keyboard mode of the console behind `fd`.
///
/// # Errors
///
/// Fails if `fd` is not a virtual console.
pub fn keyboard_mode(fd: impl AsFd) -> io::Result<KeyboardMode> {
    let mut mode: c_int = 0;
    // SAFETY: the fd is borrowed for the duration of the call and `mode` is a
    // valid, writable c_int, which is what KDGKBMODE stores into.
    unsafe { kdgkbmode(fd.as_fd().as_raw_fd(), &mut mode) }.map_err(io::Error::from)?;
    Ok(KeyboardMode::from_raw(mode))
}

/// Switch the console behind `fd` to `mode`.
///
/// # Errors
///
/// Fails if `fd` is not a virtual console or the caller may not change its
/// mode.
pub fn set_keyboard_mode(fd: impl AsFd, mode: KeyboardMode) -> io::Result<()> {
    // SAFETY: KDSKBMODE takes its argument by value; the fd is borrowed for
    // the duration of the call.
    unsafe { kdskbmode(fd.as_fd().as_raw_fd(), mode.to_raw()) }.map_err(io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_match_kd_h() {
        assert_eq!(KeyboardMode::Raw.to_raw(), 0);
        assert_eq!(KeyboardMode::MediumRaw.to_raw(), 2);
        assert_eq!(KeyboardMode::Off.to_raw(), 4);
        for raw in -1..8 {
            assert_eq!(KeyboardMode::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(KeyboardMode::from_raw(7), KeyboardMode::Other(7));
    }

    #[test]
    fn ioctls_fail_on_non_console() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        assert!(keyboard_mode(&a).is_err());
        assert!(set_keyboard_mode(&a, KeyboardMode::MediumRaw).is_err());
    }
}
