//! Core constants for the reader pipeline.
//!
//! Default values here match the behaviour of deployed readers: a Wiegand
//! keypad/card reader wired to two data lines, `#` as the start/stop key and a
//! brute-force policy of three attempts in twenty seconds.
//!
//! # Usage
//!
//! ```
//! use doorman_core::constants::*;
//!
//! assert!(ALLOWED_DELIMITERS.contains(&DEFAULT_DELIMITER));
//! assert_eq!(DEFAULT_KEYSTROKE_BITS, 4);
//! ```

// ============================================================================
// Keypad
// ============================================================================

/// The only characters that may be configured as the keypad start/stop key.
pub const ALLOWED_DELIMITERS: [char; 2] = ['#', '*'];

/// Default keypad start/stop key.
pub const DEFAULT_DELIMITER: char = '#';

/// Default keypad inactivity timeout, in seconds.
pub const DEFAULT_KEYPAD_TIMEOUT_SECS: f64 = 5.0;

/// Bit width of a single keystroke frame sent by the keypad.
pub const DEFAULT_KEYSTROKE_BITS: u32 = 4;

/// Keystroke value the keypad sends for `*`.
pub const KEY_CODE_STAR: u64 = 10;

/// Keystroke value the keypad sends for `#`.
pub const KEY_CODE_HASH: u64 = 11;

// ============================================================================
// Lockout
// ============================================================================

/// Default number of attempts that trigger a brute-force lockout.
pub const DEFAULT_BRUTE_FORCE_ATTEMPTS: usize = 3;

/// Default window, in seconds, the brute-force attempts must fall within.
pub const DEFAULT_BRUTE_FORCE_WINDOW_SECS: f64 = 20.0;

/// Default lockout duration, in seconds.
pub const DEFAULT_LOCKOUT_SECS: f64 = 600.0;

/// Default minimum spacing between keystrokes, in seconds.
///
/// Keystrokes closer together than this are treated as replayed or
/// automated input.
pub const DEFAULT_OVERSPEED_SECS: f64 = 0.1;

/// Upper bound for the overspeed interval. Anything this slow is human typing.
pub const MAX_OVERSPEED_SECS: f64 = 1.0;

// ============================================================================
// Signal decoding
// ============================================================================

/// Default quiet time on both lines that ends a frame, in milliseconds.
pub const DEFAULT_BIT_GAP_MS: u64 = 5;

/// Largest frame the decoder can carry in its accumulator.
pub const MAX_FRAME_BITS: u32 = 64;

/// Default bit width of card frames produced by the reader.
pub const DEFAULT_CARD_BITS: u32 = 34;

/// Parity bits wrapped around every card frame (one leading, one trailing).
pub const PARITY_BITS: u32 = 2;

// ============================================================================
// Credential store
// ============================================================================

/// Owner recorded for credential entries that do not name one.
pub const OWNER_NOT_GIVEN: &str = "USER NOT GIVEN";

/// Separator placed between owners when duplicate credentials are merged.
pub const OWNER_SEPARATOR: &str = " | ";

/// Separator stripped from credential tokens (`04:A2:19:7B`).
pub const TOKEN_SEPARATOR: char = ':';

/// Longest card token (in hex characters) a Wiegand reader reports in full.
pub const MAX_READER_TOKEN_LEN: usize = 8;

/// Prefix readers report in front of a long (7-byte) UID.
pub const LONG_UID_PREFIX: &str = "88";

/// Number of leading UID hex characters readers report after the prefix.
pub const LONG_UID_KEPT_CHARS: usize = 6;
