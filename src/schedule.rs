//! Retry scheduling across servers and sweeps.
//!
//! The scheduler consumes an entry's retry parameters and a failure signal
//! and produces the next action. It tracks two counters: attempts against
//! the current server, and completed sweeps across all selectable servers.
//! Both reset on success. The scheduler knows nothing about timers or the
//! registry; the caller supplies whether the failing server was the last of
//! the current sweep.

use crate::registry::RetryParams;
use std::time::Duration;

/// Next action after a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Re-attempt the same server immediately (retry timer of zero).
    RetryNow,
    /// Re-attempt the same server after the given delay.
    RetryAfter(Duration),
    /// This server is exhausted; move to the next selectable entry.
    AdvanceToNextServer,
    /// The sweep is exhausted; start over from the first selectable entry
    /// after the given delay.
    StartNewSweepAfter(Duration),
    /// All servers and sweeps are exhausted. Terminal for this mode.
    GiveUp,
}

impl Decision {
    /// Static label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RetryNow => "retry_now",
            Self::RetryAfter(_) => "retry_after",
            Self::AdvanceToNextServer => "advance",
            Self::StartNewSweepAfter(_) => "new_sweep",
            Self::GiveUp => "give_up",
        }
    }
}

/// Two-level retry state for one registration attempt sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryScheduler {
    attempts_on_current_server: u32,
    sweeps_completed: u32,
}

impl RetryScheduler {
    /// Fresh scheduler: no attempts made, no sweeps completed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts already made against the current server.
    pub fn attempts_on_current_server(&self) -> u32 {
        self.attempts_on_current_server
    }

    /// Sweeps completed in the current sequence.
    pub fn sweeps_completed(&self) -> u32 {
        self.sweeps_completed
    }

    /// Decide the next action after a failure against the current server.
    ///
    /// `params` are the failing entry's retry parameters (the no-retry
    /// fallback applies to entries without them); `last_in_sweep` is whether
    /// that entry was the final selectable one of the current sweep, in which
    /// case its sequence parameters govern the sweep decision.
    pub fn on_failure(&mut self, params: RetryParams, last_in_sweep: bool) -> Decision {
        if self.attempts_on_current_server < params.retry_count {
            self.attempts_on_current_server += 1;
            return if params.retry_timer_s == 0 {
                Decision::RetryNow
            } else {
                Decision::RetryAfter(params.retry_timer())
            };
        }

        // Server exhausted; the counter starts over for the next entry.
        self.attempts_on_current_server = 0;

        if !last_in_sweep {
            return Decision::AdvanceToNextServer;
        }

        if self.sweeps_completed < params.sequence_retry_count {
            self.sweeps_completed += 1;
            return Decision::StartNewSweepAfter(params.sequence_delay());
        }

        Decision::GiveUp
    }

    /// A registration succeeded: reset both counters and go quiescent.
    pub fn on_success(&mut self) {
        *self = Self::default();
    }

    /// Reset only the per-server attempt counter (active entry removed).
    pub fn reset_attempts(&mut self) {
        self.attempts_on_current_server = 0;
    }

    /// Reset the whole sequence (mode change or restart).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(retry: u32, timer: u32, seq_retry: u32, seq_delay: u32) -> RetryParams {
        RetryParams {
            retry_count: retry,
            retry_timer_s: timer,
            sequence_retry_count: seq_retry,
            sequence_delay_timer_s: seq_delay,
        }
    }

    #[test]
    fn test_exactly_retry_count_retries_before_advance() {
        for retry_count in 0..5 {
            let mut scheduler = RetryScheduler::new();
            let p = params(retry_count, 10, 0, 0);
            let mut retries = 0;
            loop {
                match scheduler.on_failure(p, false) {
                    Decision::RetryAfter(d) => {
                        assert_eq!(d, Duration::from_secs(10));
                        retries += 1;
                    }
                    Decision::AdvanceToNextServer => break,
                    other => panic!("unexpected decision: {other:?}"),
                }
            }
            assert_eq!(retries, retry_count);
        }
    }

    #[test]
    fn test_zero_retry_timer_means_retry_now() {
        let mut scheduler = RetryScheduler::new();
        assert_eq!(
            scheduler.on_failure(params(1, 0, 0, 0), false),
            Decision::RetryNow
        );
    }

    #[test]
    fn test_no_retry_params_advance_immediately() {
        let mut scheduler = RetryScheduler::new();
        assert_eq!(
            scheduler.on_failure(RetryParams::DISABLED, false),
            Decision::AdvanceToNextServer
        );
        // And at the sweep boundary, give up immediately.
        assert_eq!(
            scheduler.on_failure(RetryParams::DISABLED, true),
            Decision::GiveUp
        );
    }

    #[test]
    fn test_exactly_sequence_retry_count_sweeps_before_give_up() {
        for seq_retries in 0..4 {
            let mut scheduler = RetryScheduler::new();
            let p = params(0, 0, seq_retries, 30);
            let mut sweeps = 0;
            loop {
                match scheduler.on_failure(p, true) {
                    Decision::StartNewSweepAfter(d) => {
                        assert_eq!(d, Duration::from_secs(30));
                        sweeps += 1;
                    }
                    Decision::GiveUp => break,
                    other => panic!("unexpected decision: {other:?}"),
                }
            }
            assert_eq!(sweeps, seq_retries);
        }
    }

    #[test]
    fn test_two_server_scenario() {
        // retry_count = 2, sequence_retry_count = 1, registry [A, B].
        let p = params(2, 30, 1, 120);
        let mut scheduler = RetryScheduler::new();

        // Sweep 1, server A: three failures, two retries, then advance.
        assert_eq!(scheduler.on_failure(p, false), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, false), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, false), Decision::AdvanceToNextServer);

        // Sweep 1, server B (last in sweep): retries then a new sweep.
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(
            scheduler.on_failure(p, true),
            Decision::StartNewSweepAfter(Duration::from_secs(120))
        );

        // Sweep 2: both servers exhaust again; no sweeps remain.
        assert_eq!(scheduler.on_failure(p, false), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, false), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, false), Decision::AdvanceToNextServer);
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryAfter(Duration::from_secs(30)));
        assert_eq!(scheduler.on_failure(p, true), Decision::GiveUp);
    }

    #[test]
    fn test_success_resets_both_counters() {
        let p = params(3, 5, 2, 10);
        let mut scheduler = RetryScheduler::new();
        scheduler.on_failure(p, true);
        scheduler.on_failure(p, true);
        assert!(scheduler.attempts_on_current_server() > 0);

        scheduler.on_success();
        assert_eq!(scheduler.attempts_on_current_server(), 0);
        assert_eq!(scheduler.sweeps_completed(), 0);
    }

    #[test]
    fn test_single_server_registry_sweeps() {
        // Registry of size 1: every failure sits at the sweep boundary.
        let p = params(1, 0, 1, 0);
        let mut scheduler = RetryScheduler::new();
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryNow);
        assert_eq!(
            scheduler.on_failure(p, true),
            Decision::StartNewSweepAfter(Duration::ZERO)
        );
        assert_eq!(scheduler.on_failure(p, true), Decision::RetryNow);
        assert_eq!(scheduler.on_failure(p, true), Decision::GiveUp);
    }
}
