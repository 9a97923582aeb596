#![cfg_attr(unix, deny(unsafe_code))]
#![cfg_attr(not(unix), forbid(unsafe_code))]

//! Console ownership for vtlock.
//!
//! This crate puts a Linux virtual console into the state a session lock
//! needs and guarantees it comes back out:
//!
//! 1. termios input and local flags are cleared (no echo, no line editing,
//!    no signal keys), flushing pending input;
//! 2. the keyboard is switched to medium-raw mode, so the kernel stops
//!    interpreting keys (including console switches) and delivers one byte
//!    per key event instead;
//! 3. the screen and scrollback are optionally cleared.
//!
//! [`ConsoleSession`] restores all of it on drop, on panic, and on
//! SIGTERM/SIGHUP/SIGQUIT/SIGALRM. [`RawKeyboard`] reads the event bytes and
//! feeds them to `vtlock_core::pump`.
//!
//! # Usage
//!
//! ```no_run
//! use vtlock_core::{Decoder, DecoderConfig, KeyboardTables, Layout, OutputEncoder, pump};
//! use vtlock_tty::{ConsoleSession, SessionOptions};
//!
//! let session = ConsoleSession::new(SessionOptions::from_env())?;
//! let tables = KeyboardTables::new(Layout::us());
//! let mut decoder = Decoder::new(&tables, DecoderConfig::from_env());
//! let mut out = OutputEncoder::new(std::io::sink());
//! pump(&mut decoder, session.keyboard()?, &mut out)?;
//! // Console restored when `session` is dropped.
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(unix)]
pub mod kbd_mode;

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use vtlock_core::RawEventSource;
#[allow(unused_imports)]
use vtlock_core::{debug, info, warn};

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::os::fd::AsFd;
#[cfg(unix)]
use std::sync::{Mutex, OnceLock, PoisonError, TryLockError};
#[cfg(unix)]
use std::time::Instant;

#[cfg(unix)]
use kbd_mode::KeyboardMode;
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::poll::{PollFd, PollFlags, PollTimeout};
#[cfg(unix)]
use rustix::termios::{self, InputModes, LocalModes, OptionalActions, Termios};
#[cfg(unix)]
use signal_hook::consts::signal::{SIGALRM, SIGHUP, SIGQUIT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

// ── Escape Sequences ─────────────────────────────────────────────────────

/// Home, clear screen, clear scrollback.
const SETUP_SEQUENCE: &[u8] = b"\x1b[H\x1b[2J\x1b[3J";
/// Home, clear screen.
const TEARDOWN_SEQUENCE: &[u8] = b"\x1b[H\x1b[2J";

/// Write the screen-clearing sequence used when a session starts.
///
/// # Errors
///
/// Returns the writer's error.
pub fn write_setup_sequence(writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(SETUP_SEQUENCE)?;
    writer.flush()
}

/// Write the screen-clearing sequence used when a session ends.
///
/// # Errors
///
/// Returns the writer's error.
pub fn write_teardown_sequence(writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(TEARDOWN_SEQUENCE)?;
    writer.flush()
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Failures while taking over the console.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a console session is already active")]
    AlreadyActive,

    #[error("no terminal available (stdin is not a tty and /dev/tty cannot be opened)")]
    NotATerminal,

    #[error("failed to change terminal attributes: {0}")]
    Termios(#[source] io::Error),

    #[error("failed to change keyboard mode (is this a virtual console?): {0}")]
    KeyboardMode(#[source] io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── Session Options ──────────────────────────────────────────────────────

/// Configuration for a [`ConsoleSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Clear the screen and scrollback on entry (and the screen on exit).
    pub clear_screen: bool,
    /// Bounded wait per raw event for [`ConsoleSession::keyboard`]; `None`
    /// blocks indefinitely.
    pub read_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            clear_screen: true,
            read_timeout: None,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Load options from environment variables.
    ///
    /// Reads:
    /// - `VTLOCK_READ_TIMEOUT_MS`: bounded wait per raw event in milliseconds
    /// - `VTLOCK_NO_CLEAR`: set to "1" or "true" to leave the screen alone
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load options using a custom environment lookup (for tests).
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(val) = get_env("VTLOCK_READ_TIMEOUT_MS")
            && let Ok(ms) = val.trim().parse::<u64>()
        {
            options.read_timeout = Some(Duration::from_millis(ms));
        }

        if let Some(val) = get_env("VTLOCK_NO_CLEAR") {
            options.clear_screen = !(val == "1" || val.eq_ignore_ascii_case("true"));
        }

        options.validated()
    }

    /// A zero timeout would make every read return immediately; treat it as
    /// no timeout.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.read_timeout == Some(Duration::ZERO) {
            self.read_timeout = None;
        }
        self
    }
}

// ── Session Lock ─────────────────────────────────────────────────────────

static CONSOLE_SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
struct SessionLock;

impl SessionLock {
    fn acquire() -> Result<Self, SessionError> {
        if CONSOLE_SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyActive);
        }
        Ok(Self)
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        CONSOLE_SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

// ── Saved Console State ──────────────────────────────────────────────────

/// What must be put back, shared with the panic hook and signal thread.
#[cfg(unix)]
#[derive(Debug)]
struct SavedConsole {
    console: File,
    termios: Option<Termios>,
    keyboard_mode: Option<KeyboardMode>,
    clear_screen: bool,
}

#[cfg(unix)]
static SAVED_CONSOLE: Mutex<Option<SavedConsole>> = Mutex::new(None);

/// Run `f` on the saved state with the lock held.
///
/// Restores run inside `f`, so a blocking caller that arrives mid-restore
/// returns only after it finished. With `wait == false` this gives up
/// instead of blocking, for callers that may run on a thread already holding
/// the lock (the panic hook).
#[cfg(unix)]
fn with_saved<R>(wait: bool, f: impl FnOnce(&mut Option<SavedConsole>) -> R) -> Option<R> {
    let mut guard = if wait {
        SAVED_CONSOLE.lock().unwrap_or_else(PoisonError::into_inner)
    } else {
        match SAVED_CONSOLE.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        }
    };
    Some(f(&mut guard))
}

/// Restore in reverse order of entry. Every step is attempted.
#[cfg(unix)]
fn restore_console(mut saved: SavedConsole) {
    if let Some(mode) = saved.keyboard_mode.take() {
        match kbd_mode::set_keyboard_mode(&saved.console, mode) {
            Ok(()) => info!(?mode, "keyboard mode restored"),
            Err(_err) => warn!(err = %_err, "failed to restore keyboard mode"),
        }
    }

    if let Some(original) = saved.termios.take() {
        match termios::tcsetattr(&saved.console, OptionalActions::Flush, &original) {
            Ok(()) => info!("terminal attributes restored"),
            Err(_err) => warn!(err = %_err, "failed to restore terminal attributes"),
        }
    }

    if saved.clear_screen
        && let Err(_err) = write_teardown_sequence(&mut saved.console)
    {
        warn!(err = %_err, "failed to clear screen");
    }
    let _ = saved.console.flush();
}

/// Best-effort cleanup for termination paths that skip `Drop`.
///
/// Call this before `std::process::exit` to put the console back when
/// unwinding won't run destructors.
pub fn best_effort_cleanup_for_exit() {
    best_effort_cleanup(true);
}

fn best_effort_cleanup(wait: bool) {
    #[cfg(unix)]
    let _ = with_saved(wait, |saved| {
        if let Some(saved) = saved.take() {
            restore_console(saved);
        }
    });
    #[cfg(not(unix))]
    let _ = wait;
}

/// Clear input and local modes. The original attributes are recorded
/// before the change so an interrupted entry still restores them.
#[cfg(unix)]
fn lock_termios(console: &File) -> io::Result<()> {
    let original = termios::tcgetattr(console)?;
    let mut locked = original.clone();
    locked.input_modes = InputModes::empty();
    locked.local_modes = LocalModes::empty();
    with_saved(true, |saved| {
        if let Some(saved) = saved {
            saved.termios = Some(original);
        }
    });
    termios::tcsetattr(console, OptionalActions::Flush, &locked)?;
    Ok(())
}

/// Switch to medium-raw, recording the previous mode first. Returns the
/// previous mode.
#[cfg(unix)]
fn enter_medium_raw(console: &File) -> io::Result<KeyboardMode> {
    let previous = kbd_mode::keyboard_mode(console)?;
    with_saved(true, |saved| {
        if let Some(saved) = saved {
            saved.keyboard_mode = Some(previous);
        }
    });
    kbd_mode::set_keyboard_mode(console, KeyboardMode::MediumRaw)?;
    Ok(previous)
}

fn install_panic_hook() {
    #[cfg(unix)]
    {
        static HOOK: OnceLock<()> = OnceLock::new();
        HOOK.get_or_init(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                best_effort_cleanup(false);
                previous(info);
            }));
        });
    }
}

// ── Signal Guard ─────────────────────────────────────────────────────────

#[cfg(unix)]
#[derive(Debug)]
struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalGuard {
    fn new() -> Result<Self, SessionError> {
        let mut signals =
            Signals::new([SIGTERM, SIGHUP, SIGQUIT, SIGALRM]).map_err(SessionError::Signals)?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("vtlock-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    warn!(signal, "termination signal received, restoring console");
                    best_effort_cleanup(true);
                    std::process::exit(128 + signal);
                }
            })
            .map_err(SessionError::Signals)?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Console Session ──────────────────────────────────────────────────────

/// Exclusive ownership of the console keyboard.
///
/// # Contract
///
/// - **Exclusive ownership**: only one session can exist per process; a
///   second [`ConsoleSession::new`] fails with [`SessionError::AlreadyActive`].
/// - **Cleanup guarantee**: when dropped (normally or via panic) or when a
///   termination signal arrives, the keyboard mode and terminal attributes
///   are restored and the screen is cleared.
///
/// # Cleanup Order
///
/// 1. Keyboard mode (so a stuck session never leaves a dead keyboard)
/// 2. Terminal attributes
/// 3. Screen clear (if enabled), flush
/// 4. Signal handlers removed
/// 5. Session lock released
#[derive(Debug)]
pub struct ConsoleSession {
    /// `new_for_tests` skips this to allow parallel headless tests.
    session_lock: Option<SessionLock>,
    options: SessionOptions,
    #[cfg(unix)]
    console: Option<File>,
    #[cfg(unix)]
    signal_guard: Option<SignalGuard>,
}

impl ConsoleSession {
    /// Take over the console.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if another session is active, no terminal
    /// is available, or a mode change fails. Any change already made is
    /// undone before returning.
    #[cfg(unix)]
    pub fn new(options: SessionOptions) -> Result<Self, SessionError> {
        install_panic_hook();

        let session_lock = SessionLock::acquire()?;

        // Before any mode change, so a failure here leaves nothing to undo.
        let signal_guard = Some(SignalGuard::new()?);

        let console = open_console()?;
        let mut session = Self {
            session_lock: Some(session_lock),
            options: options.clone(),
            console: Some(console.try_clone()?),
            signal_guard,
        };

        // From here on, an early return drops `session`, which restores
        // whatever has been saved so far.
        with_saved(true, |saved| {
            *saved = Some(SavedConsole {
                console,
                termios: None,
                keyboard_mode: None,
                clear_screen: options.clear_screen,
            });
        });

        if options.clear_screen {
            session.with_console(write_setup_sequence)?;
        }

        session
            .with_console(|tty| lock_termios(tty))
            .map_err(SessionError::Termios)?;
        info!("terminal attributes cleared");

        let _previous = session
            .with_console(|tty| enter_medium_raw(tty))
            .map_err(SessionError::KeyboardMode)?;
        info!(previous = ?_previous, "keyboard switched to medium-raw");

        Ok(session)
    }

    /// Create a session for tests without touching the real terminal.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn new_for_tests(options: SessionOptions) -> Self {
        install_panic_hook();
        Self {
            session_lock: None,
            options,
            #[cfg(unix)]
            console: None,
            #[cfg(unix)]
            signal_guard: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// A raw event reader over a duplicate of the console descriptor, using
    /// the session's read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotATerminal`] for test sessions and an I/O
    /// error if the descriptor cannot be duplicated.
    #[cfg(unix)]
    pub fn keyboard(&self) -> Result<RawKeyboard<File>, SessionError> {
        let console = self.console.as_ref().ok_or(SessionError::NotATerminal)?;
        Ok(RawKeyboard::new(console.try_clone()?).with_timeout(self.options.read_timeout))
    }

    #[cfg(unix)]
    fn with_console<R>(&mut self, f: impl FnOnce(&mut File) -> io::Result<R>) -> io::Result<R> {
        match self.console.as_mut() {
            Some(console) => f(console),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn cleanup(&mut self) {
        best_effort_cleanup(true);

        #[cfg(unix)]
        {
            let _ = self.console.take();
            let _ = self.signal_guard.take();
        }

        // Release process-wide exclusivity only after the console is restored.
        if self.session_lock.take().is_some() {
            debug!("console session released");
        }
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        // Test sessions never saved anything, and must not restore state
        // saved by a real session.
        if self.session_lock.is_some() {
            self.cleanup();
        }
    }
}

/// stdin if it is a terminal, otherwise `/dev/tty`.
#[cfg(unix)]
fn open_console() -> Result<File, SessionError> {
    let stdin = io::stdin();
    if termios::isatty(stdin.as_fd()) {
        let fd = stdin.as_fd().try_clone_to_owned()?;
        return Ok(File::from(fd));
    }
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
        .map_err(|_| SessionError::NotATerminal)
}

// ── Raw Keyboard ─────────────────────────────────────────────────────────

/// Reads medium-raw keyboard events one byte at a time.
///
/// Returns `None` from [`RawEventSource::read_raw`] on end of file or when
/// the optional timeout elapses with no input. Interrupted reads are
/// retried.
#[derive(Debug)]
pub struct RawKeyboard<R> {
    reader: R,
    timeout: Option<Duration>,
}

impl<R: Read> RawKeyboard<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            timeout: None,
        }
    }

    /// Bound the wait for each event.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(unix)]
impl<R: Read + AsFd> RawKeyboard<R> {
    /// Wait until the reader is readable or `timeout` elapses.
    ///
    /// Interrupted and short polls resume with the time left until the
    /// deadline.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let wait = match deadline {
                Some(deadline) => match poll_timeout_until(deadline, Instant::now()) {
                    Some(wait) => wait,
                    None => return Ok(false),
                },
                None => PollTimeout::NONE,
            };
            let mut poll_fds = [PollFd::new(self.reader.as_fd(), PollFlags::POLLIN)];
            match nix::poll::poll(&mut poll_fds, wait) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => return Ok(true),
                Err(err) => return Err(io::Error::from(err)),
            }
        }
    }
}

/// The `poll` timeout left until `deadline`, rounded up to whole
/// milliseconds, or `None` once it has passed.
#[cfg(unix)]
fn poll_timeout_until(deadline: Instant, now: Instant) -> Option<PollTimeout> {
    let remaining = deadline.checked_duration_since(now)?;
    if remaining.is_zero() {
        return None;
    }
    let millis = remaining.as_nanos().div_ceil(1_000_000);
    Some(PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX))
}

#[cfg(unix)]
impl<R: Read + AsFd> RawEventSource for RawKeyboard<R> {
    fn read_raw(&mut self) -> io::Result<Option<u8>> {
        if let Some(timeout) = self.timeout
            && !self.wait_readable(timeout)?
        {
            debug!(timeout_ms = timeout.as_millis() as u64, "keyboard wait elapsed");
            return Ok(None);
        }
        self.read_byte()
    }
}
