//! Lockout policy.
//!
//! Two independent triggers share one lock:
//!
//! - **Brute force**: the last `N` credential checks all fell within the
//!   configured window.
//! - **Overspeed**: two keystrokes arrived closer together than the
//!   configured interval, which humans do not manage on a keypad.
//!
//! The lock is levelled, not cumulative: while locked, neither trigger can
//! start or extend a lockout. It clears only once the configured duration
//! has elapsed since it started, at which point the attempt history is
//! emptied.
//!
//! [`LockoutPolicy`] is the plain state machine, driven with explicit
//! timestamps. [`LockoutGate`] is the shared, async owner used by the
//! pipeline: every mutation goes through one mutex, and an abortable Tokio
//! task clears the lock when its deadline passes even if no further input
//! arrives.

use doorman_core::{Error, PipelineConfig, Result};
use doorman_keypad::KeystrokeGate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// What caused a lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutKind {
    BruteForce,
    Overspeed,
}

impl fmt::Display for LockoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockoutKind::BruteForce => write!(f, "brute force"),
            LockoutKind::Overspeed => write!(f, "overspeed"),
        }
    }
}

/// Lock state. Exactly one per policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Unlocked,
    Locked { kind: LockoutKind, started_at: Instant },
}

/// Result of passing through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// The attempt may proceed.
    Unlocked,
    /// A lockout is in effect; the attempt must not proceed.
    Locked(LockoutKind),
}

impl GateStatus {
    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(self, GateStatus::Locked(_))
    }
}

/// Brute-force and overspeed lockout state machine.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    threshold: usize,
    window: Duration,
    duration: Duration,
    overspeed: Duration,
    attempts: VecDeque<Instant>,
    last_keystroke: Option<Instant>,
    state: LockoutState,
}

impl LockoutPolicy {
    /// Create an unlocked policy from the pipeline configuration.
    ///
    /// # Errors
    /// Returns `Error::Config` for a zero threshold, window or duration.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        if config.brute_force_attempts == 0 {
            return Err(Error::config("brute-force attempts must be at least 1"));
        }
        if config.brute_force_window.is_zero() || config.lockout_duration.is_zero() {
            return Err(Error::config(
                "brute-force window and lockout duration must be greater than zero",
            ));
        }
        Ok(Self {
            threshold: config.brute_force_attempts,
            window: config.brute_force_window,
            duration: config.lockout_duration,
            overspeed: config.overspeed_interval,
            attempts: VecDeque::with_capacity(config.brute_force_attempts),
            last_keystroke: None,
            state: LockoutState::Unlocked,
        })
    }

    #[must_use]
    pub fn state(&self) -> LockoutState {
        self.state
    }

    /// Attempts currently remembered for the brute-force trigger.
    #[must_use]
    pub fn recorded_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// When the current lockout ends, if locked.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            LockoutState::Unlocked => None,
            LockoutState::Locked { started_at, .. } => Some(started_at + self.duration),
        }
    }

    /// Gate a credential check.
    ///
    /// While locked the check is refused and not recorded. Otherwise it is
    /// recorded and may proceed; if it completes the brute-force threshold
    /// the lock applies from the next check on.
    pub fn check_and_record_attempt(&mut self, now: Instant) -> GateStatus {
        if let GateStatus::Locked(kind) = self.current(now) {
            debug!(%kind, "attempt refused by active lockout");
            return GateStatus::Locked(kind);
        }

        if self.attempts.len() == self.threshold {
            self.attempts.pop_front();
        }
        self.attempts.push_back(now);

        let within_window = self
            .attempts
            .front()
            .is_some_and(|&oldest| now.saturating_duration_since(oldest) <= self.window);
        if self.attempts.len() == self.threshold && within_window {
            warn!(
                attempts = self.threshold,
                window_secs = self.window.as_secs_f64(),
                "brute force lockout started"
            );
            self.engage(LockoutKind::BruteForce, now);
        }

        GateStatus::Unlocked
    }

    /// Gate a keystroke.
    ///
    /// Records the keystroke time and starts an overspeed lockout when it
    /// follows the previous keystroke too closely.
    pub fn register_keystroke(&mut self, now: Instant) -> GateStatus {
        let previous = self.last_keystroke.replace(now);

        if let GateStatus::Locked(kind) = self.current(now) {
            return GateStatus::Locked(kind);
        }

        let too_fast = previous
            .is_some_and(|last| now.saturating_duration_since(last) < self.overspeed);
        if too_fast {
            warn!(
                interval_secs = self.overspeed.as_secs_f64(),
                "overspeed lockout started"
            );
            self.engage(LockoutKind::Overspeed, now);
            return GateStatus::Locked(LockoutKind::Overspeed);
        }

        GateStatus::Unlocked
    }

    /// Clear the lock if its duration has elapsed. Returns `true` if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        let LockoutState::Locked { kind, started_at } = self.state else {
            return false;
        };
        if now.saturating_duration_since(started_at) < self.duration {
            return false;
        }
        info!(%kind, "lockout expired");
        self.state = LockoutState::Unlocked;
        self.attempts.clear();
        true
    }

    /// Forget all history and clear any lock.
    pub fn clear(&mut self) {
        if matches!(self.state, LockoutState::Locked { .. }) {
            info!("lockout cleared");
        }
        self.state = LockoutState::Unlocked;
        self.attempts.clear();
        self.last_keystroke = None;
    }

    /// Expire if due, then report the lock.
    fn current(&mut self, now: Instant) -> GateStatus {
        self.expire(now);
        match self.state {
            LockoutState::Unlocked => GateStatus::Unlocked,
            LockoutState::Locked { kind, .. } => GateStatus::Locked(kind),
        }
    }

    fn engage(&mut self, kind: LockoutKind, now: Instant) {
        if let LockoutState::Unlocked = self.state {
            self.state = LockoutState::Locked {
                kind,
                started_at: now,
            };
        }
    }
}

/// Keystrokes are refused only while an overspeed lockout is in effect.
impl KeystrokeGate for LockoutPolicy {
    fn admit_keystroke(&mut self, now: Instant) -> bool {
        !matches!(
            self.register_keystroke(now),
            GateStatus::Locked(LockoutKind::Overspeed)
        )
    }
}

#[derive(Debug)]
struct GateInner {
    policy: LockoutPolicy,
    expiry_timer: Option<AbortHandle>,
}

/// Shared lockout policy with autonomous expiry.
///
/// Cloning is cheap; all clones share the same policy.
///
/// # Examples
///
/// ```
/// use doorman_access::lockout::{GateStatus, LockoutGate};
/// use doorman_core::PipelineConfig;
///
/// #[tokio::main]
/// async fn main() -> doorman_core::Result<()> {
///     let gate = LockoutGate::new(&PipelineConfig::default())?;
///     assert_eq!(gate.check_and_record_attempt().await, GateStatus::Unlocked);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LockoutGate {
    inner: Arc<Mutex<GateInner>>,
}

impl LockoutGate {
    /// Create an unlocked gate.
    ///
    /// # Errors
    /// Returns the configuration error from [`LockoutPolicy::new`].
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(GateInner {
                policy: LockoutPolicy::new(config)?,
                expiry_timer: None,
            })),
        })
    }

    /// Gate a credential check at the current time.
    pub async fn check_and_record_attempt(&self) -> GateStatus {
        self.update(|policy| policy.check_and_record_attempt(Instant::now()))
            .await
    }

    /// Gate a keystroke at the current time.
    pub async fn register_keystroke(&self) -> GateStatus {
        self.update(|policy| policy.register_keystroke(Instant::now()))
            .await
    }

    /// Current lock state, after applying any due expiry.
    pub async fn state(&self) -> LockoutState {
        self.update(|policy| {
            policy.expire(Instant::now());
            policy.state()
        })
        .await
    }

    /// Attempts currently remembered for the brute-force trigger.
    pub async fn recorded_attempts(&self) -> usize {
        self.inner.lock().await.policy.recorded_attempts()
    }

    /// Forget all history and clear any lock, cancelling the expiry timer.
    pub async fn clear(&self) {
        self.update(LockoutPolicy::clear).await;
    }

    /// Run `f` with exclusive access to the policy.
    ///
    /// The expiry timer is started or cancelled afterwards to match the
    /// policy's state.
    pub async fn update<R>(&self, f: impl FnOnce(&mut LockoutPolicy) -> R) -> R {
        let mut inner = self.inner.lock().await;
        let result = f(&mut inner.policy);
        sync_expiry_timer(&self.inner, &mut inner);
        result
    }
}

/// Keep exactly one expiry task alive while locked, none while unlocked.
fn sync_expiry_timer(shared: &Arc<Mutex<GateInner>>, inner: &mut GateInner) {
    match inner.policy.deadline() {
        Some(deadline) if inner.expiry_timer.is_none() => {
            let weak = Arc::downgrade(shared);
            let task = tokio::spawn(expire_at(weak, deadline));
            inner.expiry_timer = Some(task.abort_handle());
        }
        None => {
            if let Some(timer) = inner.expiry_timer.take() {
                timer.abort();
            }
        }
        Some(_) => {}
    }
}

async fn expire_at(gate: Weak<Mutex<GateInner>>, deadline: Instant) {
    sleep_until(deadline).await;
    let Some(shared) = gate.upgrade() else {
        return;
    };
    let mut inner = shared.lock().await;
    inner.policy.expire(Instant::now());
    // This task is finishing; a lock that is somehow still active gets a new one.
    inner.expiry_timer = None;
    sync_expiry_timer(&shared, &mut inner);
}
