//! Wiegand signal decoding and frame canonicalization.
//!
//! This crate turns raw edges on a reader's two data lines into canonical
//! card tokens:
//!
//! ```text
//! EdgeSource ──► WiegandDecoder ──► BitFrame ──► FrameCanonicalizer ──► Routed
//!                (FrameReader)                                          ├─ Card(token)
//!                                                                       ├─ Keystroke(value)
//!                                                                       └─ Rejected(reason)
//! ```
//!
//! Real GPIO drivers implement [`EdgeSource`]; [`MockEdgeSource`] stands in
//! for tests and the simulator.

pub mod canonical;
pub mod decoder;
pub mod reader;
pub mod source;

pub use canonical::{FrameCanonicalizer, Rejection, Routed};
pub use decoder::WiegandDecoder;
pub use reader::FrameReader;
pub use source::{EdgeSource, MockEdgeSource, MockEdgeSourceHandle};
