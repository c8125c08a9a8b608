//! Retry schedule behavior driven end-to-end through the manager.

use lwreg::{
    AttemptResult, BootstrapWindow, CredentialStore, RegistrationManager, RetryParams,
    ServerEntry, ServerRegistry,
};
use std::time::{Duration, Instant};

fn op(ssid: u16, retry: Option<RetryParams>) -> ServerEntry {
    let entry = ServerEntry::operational(
        ssid,
        format!("coap://server-{ssid}.example.com:5683"),
        CredentialStore::nosec(),
    );
    match retry {
        Some(params) => entry.with_retry(params),
        None => entry,
    }
}

fn manager_with(entries: Vec<ServerEntry>) -> RegistrationManager {
    let mut registry = ServerRegistry::new();
    for entry in entries {
        registry.insert(entry).unwrap();
    }
    RegistrationManager::new(
        registry,
        BootstrapWindow::new(Duration::ZERO, Some(Duration::from_secs(60))),
        86_400,
    )
}

/// Fail every attempt, jumping time across wait states, until the manager
/// gives up. Returns the SSIDs attempted, in order.
fn drive_to_exhaustion(manager: &mut RegistrationManager, mut now: Instant) -> Vec<u16> {
    let mut attempted = Vec::new();
    for _ in 0..1000 {
        if let Some(target) = manager.current_target() {
            attempted.push(target.ssid);
            manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
        } else if let Some(at) = manager.session_state().waiting_until() {
            now = at;
            manager.notify_time_dependent(now);
        } else {
            break;
        }
    }
    attempted
}

#[test]
fn two_servers_two_sweeps_then_give_up() {
    // retry_count = 2, sequence_retry_count = 1, registry = [A, B].
    let params = RetryParams {
        retry_count: 2,
        retry_timer_s: 30,
        sequence_retry_count: 1,
        sequence_delay_timer_s: 120,
    };
    let mut manager = manager_with(vec![op(1, Some(params)), op(2, Some(params))]);
    let now = Instant::now();
    manager.start(now);

    let attempted = drive_to_exhaustion(&mut manager, now);

    // 3 attempts per server per sweep (1 initial + 2 retries), 2 sweeps.
    assert_eq!(
        attempted,
        vec![1, 1, 1, 2, 2, 2, 1, 1, 1, 2, 2, 2],
        "attempt sequence across sweeps"
    );
    assert!(manager.session_state().gave_up());
    assert!(manager.current_target().is_none());
}

#[test]
fn entry_without_retry_params_advances_immediately() {
    let mut manager = manager_with(vec![op(1, None), op(2, None)]);
    let now = Instant::now();
    manager.start(now);

    assert_eq!(manager.current_target().unwrap().ssid, 1);
    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);

    // No retry, no wait: the next server is active at once.
    assert_eq!(manager.current_target().unwrap().ssid, 2);
    manager.on_attempt_result(AttemptResult::Timeout, now);

    // No sequence retries either: one sweep and done.
    assert!(manager.session_state().gave_up());
}

#[test]
fn retry_wait_respects_the_retry_timer() {
    let params = RetryParams {
        retry_count: 1,
        retry_timer_s: 30,
        sequence_retry_count: 0,
        sequence_delay_timer_s: 0,
    };
    let mut manager = manager_with(vec![op(1, Some(params))]);
    let now = Instant::now();
    manager.start(now);

    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    assert!(manager.current_target().is_none());

    // Not due yet.
    manager.notify_time_dependent(now + Duration::from_secs(29));
    assert!(manager.current_target().is_none());

    // Due exactly at the timer.
    manager.notify_time_dependent(now + Duration::from_secs(30));
    let target = manager.current_target().unwrap();
    assert_eq!(target.ssid, 1);
}

#[test]
fn sweep_delay_separates_sweeps() {
    let params = RetryParams {
        retry_count: 0,
        retry_timer_s: 0,
        sequence_retry_count: 1,
        sequence_delay_timer_s: 120,
    };
    let mut manager = manager_with(vec![op(1, Some(params))]);
    let now = Instant::now();
    manager.start(now);

    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    assert!(manager.current_target().is_none());
    let resume_at = manager.session_state().waiting_until().unwrap();
    assert_eq!(resume_at, now + Duration::from_secs(120));

    manager.notify_time_dependent(resume_at);
    assert_eq!(manager.current_target().unwrap().ssid, 1);

    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    assert!(manager.session_state().gave_up());
}

#[test]
fn success_resets_counters_for_the_next_sequence() {
    let params = RetryParams {
        retry_count: 1,
        retry_timer_s: 0,
        sequence_retry_count: 0,
        sequence_delay_timer_s: 0,
    };
    let mut manager = manager_with(vec![op(1, Some(params))]);
    let now = Instant::now();
    manager.start(now);

    // Burn the single retry, then succeed.
    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    manager.on_attempt_result(AttemptResult::Success, now);
    assert_eq!(manager.scheduler().attempts_on_current_server(), 0);
    assert_eq!(manager.scheduler().sweeps_completed(), 0);

    // Registration lost later: the full retry budget is available again.
    manager.on_attempt_result(AttemptResult::Failure("lifetime expired".into()), now);
    assert_eq!(manager.current_target().unwrap().ssid, 1);
    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    // One retry remains before exhaustion.
    assert!(manager.current_target().is_some());
    manager.on_attempt_result(AttemptResult::Failure("refused".into()), now);
    assert!(manager.session_state().gave_up());
}

#[test]
fn mixed_retry_parameters_per_entry() {
    // A retries twice with no delay; B has no retry budget at all. The
    // sweep decision is governed by the entry that closed the sweep (B).
    let a = RetryParams {
        retry_count: 2,
        retry_timer_s: 0,
        sequence_retry_count: 5,
        sequence_delay_timer_s: 60,
    };
    let mut manager = manager_with(vec![op(1, Some(a)), op(2, None)]);
    let now = Instant::now();
    manager.start(now);

    let attempted = drive_to_exhaustion(&mut manager, now);
    // One sweep: A three times, B once; B's zero sequence budget ends it.
    assert_eq!(attempted, vec![1, 1, 1, 2]);
    assert!(manager.session_state().gave_up());
}
