//! Access decisions for the doorman reader pipeline.
//!
//! - [`lockout`]: brute-force and overspeed lockout, with autonomous expiry
//! - [`records`] and [`authority`]: credential-store normalization and lookup
//! - [`decision`]: the decision type and the sink seam
//! - [`controller`]: the pipeline wired together for one reader

pub mod authority;
pub mod controller;
pub mod decision;
pub mod lockout;
pub mod records;

pub use authority::{CredentialAuthority, Lookup, TokenTable};
pub use controller::{AccessController, ControllerHandle, TaskTermination};
pub use decision::{Decision, DecisionSink, DiscardSink, Outcome};
pub use lockout::{GateStatus, LockoutGate, LockoutKind, LockoutPolicy, LockoutState};
pub use records::{StoredCredential, TokenRecord};
