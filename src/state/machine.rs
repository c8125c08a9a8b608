//! Registration session state machine.
//!
//! ## State Machine
//!
//! ```text
//!                     holdoff elapsed
//! ┌──────────────────┐        ┌─────────────────────┐  finished(ok)  ┌─────────────┐
//! │ BootstrapHoldoff ├───────►│ BootstrapInProgress ├───────────────►│ Operational │
//! └────────▲─────────┘        └─────────┬───────────┘                │   attempt   │
//!          │   all operational          │ timeout / GiveUp           └──────┬──────┘
//!          │   entries exhausted        ▼                                  │
//!          └────────────────────────[ GaveUp ]◄────────────────────────────┘
//!                                               (no bootstrap entry left)
//! ```
//!
//! Within either mode, failures cycle through `RetryWait` (same server) and
//! `SweepWait` (between sweeps) as the scheduler decides. Success lands in
//! `Registered`. The states are plain data and the decision mapping is a
//! pure function, so the whole ladder is unit-testable without timers.

use crate::schedule::Decision;
use std::time::Instant;

// ============================================================================
// Mode
// ============================================================================

/// Which kind of entry the client currently selects from.
///
/// Mode is registry-level: entries never flip their own bootstrap flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Obtaining configuration from a bootstrap server.
    Bootstrap,
    /// Normal registration against operational servers.
    Operational,
}

impl Mode {
    /// Static label for log fields.
    pub fn label(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Operational => "operational",
        }
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Where the registration session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing in flight and nothing scheduled.
    Idle,
    /// Waiting out the bootstrap holdoff before the first attempt.
    BootstrapHoldoff,
    /// A bootstrap exchange is in progress (timeout window armed).
    BootstrapInProgress,
    /// A registration attempt against the current operational entry is due
    /// or outstanding.
    OperationalAttempt {
        /// How many retries preceded this attempt on the current server.
        attempt: u32,
    },
    /// Waiting out the retry timer before re-attempting the same server.
    RetryWait {
        /// When the next attempt becomes due.
        resume_at: Instant,
    },
    /// Waiting out the sequence delay before a new sweep.
    SweepWait {
        /// When the new sweep becomes due.
        resume_at: Instant,
    },
    /// Registered against a server; quiescent until a failure signal.
    Registered,
    /// All selectable servers and sweeps exhausted. Terminal.
    GaveUp,
}

impl SessionState {
    /// Whether a connection attempt is currently outstanding, i.e. the
    /// transport may be holding a target obtained from `current_target`.
    #[inline]
    pub fn attempt_outstanding(&self) -> bool {
        matches!(
            self,
            Self::OperationalAttempt { .. } | Self::BootstrapInProgress
        )
    }

    /// Whether the session reached the terminal no-reachable-server state.
    #[inline]
    pub fn gave_up(&self) -> bool {
        matches!(self, Self::GaveUp)
    }

    /// Deadline of a wait state, if any.
    pub fn waiting_until(&self) -> Option<Instant> {
        match self {
            Self::RetryWait { resume_at } | Self::SweepWait { resume_at } => Some(*resume_at),
            _ => None,
        }
    }

    /// Whether a wait state's deadline has passed.
    pub fn due(&self, now: Instant) -> bool {
        self.waiting_until().is_some_and(|at| now >= at)
    }

    /// The active-attempt state for a mode.
    pub fn active_attempt(mode: Mode, attempt: u32) -> Self {
        match mode {
            Mode::Operational => Self::OperationalAttempt { attempt },
            Mode::Bootstrap => Self::BootstrapInProgress,
        }
    }

    /// Pure mapping from a scheduler decision to the next session state.
    ///
    /// Cursor movement, bootstrap fallback and window arming are side
    /// effects owned by the manager; this function only names the state.
    pub fn for_decision(mode: Mode, decision: Decision, attempt: u32, now: Instant) -> Self {
        match decision {
            Decision::RetryNow | Decision::AdvanceToNextServer => {
                Self::active_attempt(mode, attempt)
            }
            Decision::RetryAfter(delay) => Self::RetryWait {
                resume_at: now + delay,
            },
            Decision::StartNewSweepAfter(delay) => Self::SweepWait {
                resume_at: now + delay,
            },
            Decision::GiveUp => Self::GaveUp,
        }
    }
}
