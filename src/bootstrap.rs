//! Bootstrap window controller: holdoff and timeout tracking.
//!
//! The window is armed when the client enters bootstrap mode. Holdoff is the
//! minimum delay before a bootstrap attempt may be initiated; timeout bounds
//! how long an in-progress exchange may run before it is declared failed.
//! Both are process-wide. Deadlines live inside the window state and are
//! checked by the caller's periodic tick, so a cancelled window can never
//! fire: cancellation simply removes the deadline.

use std::time::{Duration, Instant};
use tracing::debug;

/// Timer expiry reported by [`BootstrapWindow::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The holdoff elapsed; a bootstrap attempt may be initiated.
    HoldoffElapsed,
    /// The in-progress exchange exceeded the timeout.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Idle,
    Holdoff { until: Instant },
    InProgress { deadline: Option<Instant> },
}

/// Holdoff/timeout windows bounding the bootstrap sequence.
#[derive(Debug)]
pub struct BootstrapWindow {
    holdoff: Duration,
    /// `None` means wait indefinitely (explicitly configured).
    timeout: Option<Duration>,
    state: WindowState,
}

impl BootstrapWindow {
    /// Create a window with the given holdoff and timeout.
    ///
    /// A `timeout` of `None` waits indefinitely; config validation only
    /// permits that when it was asked for explicitly.
    pub fn new(holdoff: Duration, timeout: Option<Duration>) -> Self {
        Self {
            holdoff,
            timeout,
            state: WindowState::Idle,
        }
    }

    /// Arm the holdoff. With a zero holdoff the next `poll` at the same
    /// instant already reports [`WindowEvent::HoldoffElapsed`].
    pub fn arm(&mut self, now: Instant) {
        self.state = WindowState::Holdoff {
            until: now + self.holdoff,
        };
        debug!(holdoff_s = self.holdoff.as_secs(), "bootstrap holdoff armed");
    }

    /// The holdoff elapsed and an exchange begins; arm the timeout.
    pub fn begin_attempt(&mut self, now: Instant) {
        self.state = WindowState::InProgress {
            deadline: self.timeout.map(|t| now + t),
        };
    }

    /// Disarm everything. A later `poll` is a no-op regardless of deadlines
    /// that were pending at cancellation time.
    pub fn cancel(&mut self) {
        self.state = WindowState::Idle;
    }

    /// Check deadlines against `now`, consuming at most one event.
    pub fn poll(&mut self, now: Instant) -> Option<WindowEvent> {
        match self.state {
            WindowState::Idle => None,
            WindowState::Holdoff { until } => {
                if now >= until {
                    // The caller decides when the exchange actually starts.
                    self.state = WindowState::Idle;
                    Some(WindowEvent::HoldoffElapsed)
                } else {
                    None
                }
            }
            WindowState::InProgress { deadline } => match deadline {
                Some(at) if now >= at => {
                    self.state = WindowState::Idle;
                    Some(WindowEvent::TimedOut)
                }
                _ => None,
            },
        }
    }

    /// Whether the window is fully disarmed.
    pub fn is_idle(&self) -> bool {
        self.state == WindowState::Idle
    }

    /// Whether the holdoff is still running.
    pub fn in_holdoff(&self) -> bool {
        matches!(self.state, WindowState::Holdoff { .. })
    }

    /// Whether an exchange is in progress (timeout possibly armed).
    pub fn in_progress(&self) -> bool {
        matches!(self.state, WindowState::InProgress { .. })
    }

    /// Remaining holdoff, if the holdoff is running.
    pub fn holdoff_remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            WindowState::Holdoff { until } => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }
}
