//! Access decisions and the sink that receives them.

use crate::lockout::LockoutKind;
use chrono::{DateTime, Utc};
use doorman_core::{CanonicalToken, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The credential is known.
    Allowed { owner: String },
    /// The credential is unknown, or no credential set is loaded.
    DeniedByCredential,
    /// A lockout was in effect; the credential was never checked.
    DeniedByLockout { lockout: LockoutKind },
}

/// Result of one completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Correlates the decision with the sink's audit records.
    pub attempt_id: Uuid,
    pub token: CanonicalToken,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(token: CanonicalToken, outcome: Outcome) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            token,
            outcome,
            decided_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, Outcome::Allowed { .. })
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    /// Owner of the credential, for allowed attempts.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Allowed { owner } => Some(owner),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Allowed { owner } => write!(f, "ALLOWED {} ({owner})", self.token),
            Outcome::DeniedByCredential => write!(f, "DENIED {} (unknown credential)", self.token),
            Outcome::DeniedByLockout { lockout } => {
                write!(f, "DENIED {} ({lockout} lockout)", self.token)
            }
        }
    }
}

/// Receives every decision the pipeline makes.
///
/// Actuation (door strike, buzzer) and audit logging live behind this seam;
/// the pipeline never drives outputs itself. `deliver` is called while no
/// pipeline lock is held and must not block.
pub trait DecisionSink: Send + Sync + 'static {
    fn deliver(&self, decision: Decision);
}

impl DecisionSink for mpsc::UnboundedSender<Decision> {
    fn deliver(&self, decision: Decision) {
        if let Err(e) = self.send(decision) {
            warn!(attempt_id = %e.0.attempt_id, "decision receiver dropped");
        }
    }
}

/// Sink that keeps nothing. Decisions still appear in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl DecisionSink for DiscardSink {
    fn deliver(&self, _decision: Decision) {}
}
