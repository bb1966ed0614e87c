//! Access controller.
//!
//! Wires the pipeline stages together for one reader:
//!
//! ```text
//! EdgeSource ─► FrameReader ─► FrameCanonicalizer ─┬─ Card ────────────────┐
//!                                                  ├─ Keystroke ─► Keypad ─┤
//!                                                  └─ Rejected (dropped)   │
//!                                                                          ▼
//!                           DecisionSink ◄── CredentialAuthority ◄── LockoutGate
//! ```
//!
//! Every completed card read and keypad code passes through the lockout gate
//! exactly once before it reaches the credential authority, and produces
//! exactly one [`Decision`]. Rejected frames produce nothing.
//!
//! # Examples
//!
//! ```
//! use doorman_access::{AccessController, TokenTable};
//! use doorman_core::{BitFrame, PipelineConfig};
//! use tokio::sync::mpsc;
//! use tokio::time::Instant;
//!
//! #[tokio::main]
//! async fn main() -> doorman_core::Result<()> {
//!     let config = PipelineConfig::default();
//!     let table = TokenTable::from_json(
//!         r#"[{"value": "04A2197B", "type": "card", "user": "alice"}]"#,
//!         &config,
//!     )?;
//!     let (tx, _rx) = mpsc::unbounded_channel();
//!     let controller = AccessController::new(config, tx)?.with_credentials(table);
//!
//!     let frame = controller.canonicalizer().encode(34, "04A2197B").unwrap();
//!     let decision = controller.handle_frame(frame, Instant::now()).await.unwrap();
//!     assert_eq!(decision.owner(), Some("alice"));
//!     Ok(())
//! }
//! ```

use crate::authority::{CredentialAuthority, Lookup, TokenTable};
use crate::decision::{Decision, DecisionSink, Outcome};
use crate::lockout::{GateStatus, LockoutGate};
use doorman_core::{BitFrame, CanonicalToken, Error, PipelineConfig, Result};
use doorman_keypad::{Key, KeyOutcome, KeypadSession};
use doorman_wiegand::{EdgeSource, FrameCanonicalizer, FrameReader, Routed};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Access-control pipeline for a single reader.
#[derive(Debug)]
pub struct AccessController<K> {
    config: PipelineConfig,
    canonicalizer: FrameCanonicalizer,
    keypad: Mutex<KeypadSession>,
    lockout: LockoutGate,
    authority: CredentialAuthority,
    sink: K,
}

impl<K: DecisionSink> AccessController<K> {
    /// Build a controller with no credentials loaded.
    ///
    /// Must be called from within a Tokio runtime once lockouts can start,
    /// since their expiry runs as a task.
    ///
    /// # Errors
    /// Fails fast with the configuration error if `config` does not
    /// validate. This is the only fatal error the pipeline produces.
    pub fn new(config: PipelineConfig, sink: K) -> Result<Self> {
        let canonicalizer = FrameCanonicalizer::new(&config)?;
        let keypad = KeypadSession::new(&config)?;
        let lockout = LockoutGate::new(&config)?;
        Ok(Self {
            config,
            canonicalizer,
            keypad: Mutex::new(keypad),
            lockout,
            authority: CredentialAuthority::new(),
            sink,
        })
    }

    /// Load an initial credential set.
    #[must_use]
    pub fn with_credentials(self, table: TokenTable) -> Self {
        self.authority.reload(table);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &FrameCanonicalizer {
        &self.canonicalizer
    }

    pub fn lockout(&self) -> &LockoutGate {
        &self.lockout
    }

    pub fn authority(&self) -> &CredentialAuthority {
        &self.authority
    }

    /// Route one decoded frame through the pipeline. `at` is when the frame's
    /// last edge arrived.
    ///
    /// Returns the decision if the frame completed an attempt.
    pub async fn handle_frame(&self, frame: BitFrame, at: Instant) -> Option<Decision> {
        match self.canonicalizer.route(frame) {
            Routed::Card(token) => Some(self.submit(token).await),
            Routed::Keystroke(code) => {
                let key = Key::from_code(code)?;
                self.handle_key(key, at).await
            }
            Routed::Rejected(_) => None,
        }
    }

    /// Feed one keystroke, typed at `at`, to the keypad session.
    ///
    /// Key spacing is measured between these instants, so a backlog of
    /// keys handled together is not mistaken for fast typing.
    ///
    /// Returns the decision if the key completed a code.
    pub async fn handle_key(&self, key: Key, at: Instant) -> Option<Decision> {
        let outcome = {
            let mut session = self.keypad.lock().await;
            self.lockout
                .update(|policy| session.on_key(key, at, policy))
                .await
        };

        match outcome {
            KeyOutcome::Completed(token) => Some(self.submit(token).await),
            KeyOutcome::Dropped => {
                debug!(key = %key, "keystroke dropped during overspeed lockout");
                None
            }
            _ => None,
        }
    }

    /// Check a completed token against the lockout gate and, if it passes,
    /// the credential authority. The decision is delivered to the sink and
    /// returned.
    pub async fn submit(&self, token: CanonicalToken) -> Decision {
        let outcome = match self.lockout.check_and_record_attempt().await {
            GateStatus::Locked(lockout) => {
                warn!(kind = %token.kind(), %lockout, "access denied by lockout");
                Outcome::DeniedByLockout { lockout }
            }
            GateStatus::Unlocked => match self.authority.lookup(&token) {
                Lookup::Allow { owner } => {
                    info!(kind = %token.kind(), owner = %owner, "access allowed");
                    Outcome::Allowed { owner }
                }
                Lookup::Deny => {
                    info!(kind = %token.kind(), "access denied by credential");
                    Outcome::DeniedByCredential
                }
            },
        };

        let decision = Decision::new(token, outcome);
        self.sink.deliver(decision.clone());
        decision
    }

    /// When the open keypad session times out, if one is open.
    pub async fn keypad_deadline(&self) -> Option<Instant> {
        self.keypad.lock().await.deadline()
    }

    /// Close an inactive keypad session. Returns `true` if one was closed.
    pub async fn expire_keypad(&self, now: Instant) -> bool {
        self.keypad.lock().await.expire(now).is_some()
    }

    /// Discard any code being typed. Returns `true` if a session was open.
    pub async fn abort_keypad(&self) -> bool {
        self.keypad.lock().await.abort().is_some()
    }

    /// Swap in a new credential set, optionally clearing lockout state.
    pub async fn reload(&self, table: TokenTable, clear_lockout: bool) {
        self.authority.reload(table);
        if clear_lockout {
            self.lockout.clear().await;
        }
    }

    /// Process edges from `source` until it closes.
    ///
    /// Keypad sessions are expired when their deadline passes, even with no
    /// further input.
    ///
    /// # Errors
    /// Returns any source error other than the source closing.
    pub async fn run<S: EdgeSource>(&self, source: S) -> Result<()> {
        let mut reader = FrameReader::new(source, self.config.bit_gap);
        info!("access controller started");

        loop {
            let keypad_deadline = self.keypad_deadline().await;

            tokio::select! {
                frame = reader.next_timed_frame() => match frame {
                    Ok((frame, at)) => {
                        debug!(%frame, "frame decoded");
                        self.handle_frame(frame, at).await;
                    }
                    Err(Error::SourceClosed { source_name }) => {
                        info!(source = %source_name, "edge source closed, controller stopping");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
                _ = sleep_until(keypad_deadline.unwrap_or_else(Instant::now)), if keypad_deadline.is_some() => {
                    self.expire_keypad(Instant::now()).await;
                }
            }
        }
    }
}

impl<K: DecisionSink> AccessController<K> {
    /// Run the controller on its own task.
    pub fn spawn<S>(self: Arc<Self>, source: S) -> ControllerHandle
    where
        S: EdgeSource + 'static,
    {
        let task = tokio::spawn(async move { self.run(source).await });
        ControllerHandle { task }
    }
}

/// Handle to a spawned controller task.
#[derive(Debug)]
pub struct ControllerHandle {
    task: JoinHandle<Result<()>>,
}

/// How a controller task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTermination {
    /// The edge source closed.
    Finished,
    /// The task returned an error.
    Failed,
    /// The task was aborted.
    Cancelled,
    /// The task panicked.
    Panicked,
}

impl ControllerHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the controller to stop on its own.
    pub async fn join(self) -> TaskTermination {
        Self::classify(self.task.await)
    }

    /// Abort the controller and wait for it to stop.
    pub async fn shutdown(self) -> TaskTermination {
        self.task.abort();
        Self::classify(self.task.await)
    }

    fn classify(result: std::result::Result<Result<()>, JoinError>) -> TaskTermination {
        match result {
            Ok(Ok(())) => TaskTermination::Finished,
            Ok(Err(e)) => {
                warn!(error = %e, "access controller failed");
                TaskTermination::Failed
            }
            Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
            Err(_) => TaskTermination::Panicked,
        }
    }
}
