//! Keypad input for the doorman reader pipeline.
//!
//! Keystrokes arrive as short Wiegand frames; [`Key::from_code`] decodes
//! them and a [`KeypadSession`] assembles them into delimited codes.

pub mod key;
pub mod session;

pub use key::Key;
pub use session::{KeyOutcome, KeypadSession, KeystrokeGate, OpenGate, SessionState};
