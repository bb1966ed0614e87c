//! Keypad keys and keystroke decoding.

use doorman_core::constants::{KEY_CODE_HASH, KEY_CODE_STAR};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A key on a 12-key Wiegand keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Numeric digit (0-9).
    Digit(u8),

    /// Star key (*).
    Star,

    /// Hash/pound key (#).
    Hash,
}

impl Key {
    /// Decode the value of a keystroke frame.
    ///
    /// Keypads send 0-9 for digits, 10 for `*` and 11 for `#`. Anything
    /// larger usually means the two data lines are wired the wrong way round;
    /// it is logged and discarded.
    ///
    /// # Examples
    ///
    /// ```
    /// use doorman_keypad::Key;
    ///
    /// assert_eq!(Key::from_code(7), Some(Key::Digit(7)));
    /// assert_eq!(Key::from_code(11), Some(Key::Hash));
    /// assert_eq!(Key::from_code(14), None);
    /// ```
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0..=9 => Some(Key::Digit(code as u8)),
            KEY_CODE_STAR => Some(Key::Star),
            KEY_CODE_HASH => Some(Key::Hash),
            _ => {
                warn!(
                    code,
                    "unexpected keypad code - check the data lines are not swapped"
                );
                None
            }
        }
    }

    /// Parse a key from its printed character.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Key::Star),
            '#' => Some(Key::Hash),
            _ => c.to_digit(10).map(|d| Key::Digit(d as u8)),
        }
    }

    /// Character printed on the key.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Key::Digit(d) => char::from(b'0' + d.min(9)),
            Key::Star => '*',
            Key::Hash => '#',
        }
    }

    /// Keystroke value the keypad sends for this key.
    #[must_use]
    pub fn code(self) -> u64 {
        match self {
            Key::Digit(d) => u64::from(d),
            Key::Star => KEY_CODE_STAR,
            Key::Hash => KEY_CODE_HASH,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
