//! Keypad session state machine.
//!
//! Assembles single keystrokes into a code bounded by the configured
//! delimiter key (`#` or `*`).
//!
//! # States
//!
//! - `Idle`: waiting for the delimiter; every other key is ignored
//! - `Accumulating`: buffering keys until the delimiter comes again
//!
//! # Transitions
//!
//! - Idle + delimiter → Accumulating (empty buffer)
//! - Accumulating + any key after the inactivity timeout → Idle, then the
//!   key is processed again from Idle
//! - Accumulating + delimiter → Idle, code completed
//! - Accumulating + other key → key appended, unless the [`KeystrokeGate`]
//!   refuses it
//!
//! # Examples
//!
//! ```
//! use doorman_core::PipelineConfig;
//! use doorman_keypad::{Key, KeyOutcome, KeypadSession, OpenGate};
//! use tokio::time::Instant;
//!
//! let mut session = KeypadSession::new(&PipelineConfig::default()).unwrap();
//! let now = Instant::now();
//!
//! let mut outcome = KeyOutcome::Ignored;
//! for key in "#42#".chars().filter_map(Key::from_char) {
//!     outcome = session.on_key(key, now, &mut OpenGate);
//! }
//! match outcome {
//!     KeyOutcome::Completed(token) => assert_eq!(token.as_str(), "42"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use crate::key::Key;
use doorman_core::{CanonicalToken, Error, PipelineConfig, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Decides whether an ordinary keystroke may be buffered.
///
/// Called once for every key appended while accumulating, before it is
/// appended. Implementations record the keystroke time.
pub trait KeystrokeGate {
    /// Returns `false` to drop the keystroke.
    fn admit_keystroke(&mut self, now: Instant) -> bool;
}

/// Gate that admits every keystroke.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl KeystrokeGate for OpenGate {
    fn admit_keystroke(&mut self, _now: Instant) -> bool {
        true
    }
}

/// Current session state. The buffer only exists while accumulating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Accumulating { buffer: String, last_key: Instant },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Accumulating { .. } => write!(f, "Accumulating"),
        }
    }
}

/// What a keystroke did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Key pressed before the delimiter; discarded.
    Ignored,
    /// Delimiter opened a new session.
    Started,
    /// Key appended to the buffer.
    Appended,
    /// Key refused by the keystroke gate; the buffer is unchanged.
    Dropped,
    /// Delimiter closed the session; the code is ready for checking.
    Completed(CanonicalToken),
}

/// Keypad session for a single reader.
#[derive(Debug, Clone)]
pub struct KeypadSession {
    delimiter: Key,
    timeout: Duration,
    state: SessionState,
}

impl KeypadSession {
    /// Create an idle session from the pipeline configuration.
    ///
    /// # Errors
    /// Returns `Error::InvalidDelimiter` or `Error::Config` if the delimiter
    /// or timeout is invalid.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_settings(config.delimiter, config.keypad_timeout)
    }

    /// Create an idle session with an explicit delimiter and timeout.
    ///
    /// # Errors
    /// Returns `Error::InvalidDelimiter` unless `delimiter` is `#` or `*`,
    /// and `Error::Config` for a zero timeout.
    pub fn with_settings(delimiter: char, timeout: Duration) -> Result<Self> {
        let delimiter = match Key::from_char(delimiter) {
            Some(key @ (Key::Hash | Key::Star)) => key,
            _ => return Err(Error::InvalidDelimiter(delimiter)),
        };
        if timeout.is_zero() {
            return Err(Error::config("keypad timeout must be greater than zero"));
        }
        Ok(Self {
            delimiter,
            timeout,
            state: SessionState::Idle,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns `true` when no session is open.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, SessionState::Idle)
    }

    /// Keys buffered so far (empty when idle).
    #[must_use]
    pub fn buffer(&self) -> &str {
        match &self.state {
            SessionState::Idle => "",
            SessionState::Accumulating { buffer, .. } => buffer,
        }
    }

    /// First instant at which the open session counts as abandoned.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            SessionState::Idle => None,
            // The timeout is exclusive: first instant strictly past it.
            SessionState::Accumulating { last_key, .. } => {
                Some(*last_key + self.timeout + Duration::from_nanos(1))
            }
        }
    }

    /// Abandon the session if it has been inactive for longer than the
    /// timeout. Returns the discarded buffer.
    pub fn expire(&mut self, now: Instant) -> Option<String> {
        let SessionState::Accumulating { last_key, .. } = &self.state else {
            return None;
        };
        if now.saturating_duration_since(*last_key) <= self.timeout {
            return None;
        }
        let abandoned = self.reset();
        debug!(
            discarded_len = abandoned.as_ref().map_or(0, String::len),
            "keypad session timed out"
        );
        abandoned
    }

    /// Close the session without completing it. Returns the discarded buffer.
    pub fn abort(&mut self) -> Option<String> {
        let abandoned = self.reset();
        if abandoned.is_some() {
            debug!("keypad session aborted");
        }
        abandoned
    }

    /// Process one keystroke.
    ///
    /// A timed-out session is reset first and the key is then handled as if
    /// it had arrived while idle, so a delimiter right after a timeout opens
    /// a fresh session.
    pub fn on_key(&mut self, key: Key, now: Instant, gate: &mut impl KeystrokeGate) -> KeyOutcome {
        self.expire(now);

        match &mut self.state {
            SessionState::Idle if key == self.delimiter => {
                debug!("keypad session started");
                self.state = SessionState::Accumulating {
                    buffer: String::new(),
                    last_key: now,
                };
                KeyOutcome::Started
            }
            SessionState::Idle => {
                debug!(key = %key, "key pressed before the start key, ignoring");
                KeyOutcome::Ignored
            }
            SessionState::Accumulating { .. } if key == self.delimiter => {
                let code = self.reset().unwrap_or_default();
                debug!(len = code.len(), "keypad code completed");
                KeyOutcome::Completed(CanonicalToken::code(code))
            }
            SessionState::Accumulating { buffer, last_key } => {
                if !gate.admit_keystroke(now) {
                    debug!("keystroke dropped by gate");
                    return KeyOutcome::Dropped;
                }
                buffer.push(key.as_char());
                *last_key = now;
                KeyOutcome::Appended
            }
        }
    }

    fn reset(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => None,
            SessionState::Accumulating { buffer, .. } => Some(buffer),
        }
    }
}
