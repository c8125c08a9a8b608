//! Registration manager: the single writer driving retries and mode.
//!
//! Registration progress is inherently sequential (one active connection
//! attempt at a time), so one logical owner holds the scheduler, the session
//! state and the bootstrap window, and is advanced by transport outcomes and
//! a periodic tick. The registry itself sits behind an `RwLock` so external
//! collaborators can answer remote reads concurrently through
//! [`RegistryReader`] while the manager mutates.
//!
//! Writes that target the entry an outstanding attempt is using are
//! deferred: queued and applied when the attempt settles, so an in-flight
//! handshake never observes its credentials changing underneath it.

use crate::bootstrap::{BootstrapWindow, WindowEvent};
use crate::config::{Config, ConfigError, validate};
use crate::error::{Error, RegResult};
use crate::registry::{Handle, RetryParams, ServerEntry, ServerRegistry, UNDEFINED_LIFETIME};
use crate::schedule::{Decision, RetryScheduler};
use crate::security::{CredentialStore, CredentialWrite, SecurityMode};
use crate::state::{Mode, SessionState};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Transport-facing types
// ============================================================================

/// Outcome of one connection attempt, reported by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// The attempt succeeded (registration accepted, or transport up for a
    /// bootstrap exchange).
    Success,
    /// The attempt failed with a transport-provided reason.
    Failure(String),
    /// The attempt timed out.
    Timeout,
}

/// Everything the transport needs to attempt the currently active entry.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// Handle of the entry this target was built from.
    pub handle: Handle,
    /// Short Server ID of the entry.
    pub ssid: u16,
    /// Connection URI.
    pub uri: String,
    /// Transport binding token.
    pub binding_mode: String,
    /// TLS server-name-indication override.
    pub sni: Option<String>,
    /// Registration lifetime with the client default already applied.
    pub lifetime_s: i64,
    /// Snapshot of the entry's credentials.
    pub credentials: CredentialStore,
}

/// Read-only registry view for collaborators answering remote reads.
///
/// Clones are cheap and can be handed to other threads; every accessor takes
/// the shared lock and returns an owned snapshot.
#[derive(Debug, Clone)]
pub struct RegistryReader(Arc<RwLock<ServerRegistry>>);

impl RegistryReader {
    /// Snapshot one entry.
    pub fn entry(&self, handle: Handle) -> Option<ServerEntry> {
        self.0.read().get(handle).cloned()
    }

    /// Look up an entry by Short Server ID.
    pub fn find_by_short_id(&self, ssid: u16) -> Option<Handle> {
        self.0.read().find_by_short_id(ssid)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

// ============================================================================
// Deferred writes
// ============================================================================

#[derive(Debug)]
enum PendingWrite {
    Uri(String),
    Lifetime(i64),
    BindingMode(String),
    Sni(Option<String>),
    Retry(Option<RetryParams>),
    SecurityMode(SecurityMode),
    Credential(CredentialWrite),
}

// ============================================================================
// Manager
// ============================================================================

/// Single-owner orchestrator for registration, bootstrap and retries.
#[derive(Debug)]
pub struct RegistrationManager {
    registry: Arc<RwLock<ServerRegistry>>,
    window: BootstrapWindow,
    scheduler: RetryScheduler,
    mode: Mode,
    state: SessionState,
    /// Selectable handles for the current sweep, captured at sweep start.
    order: Vec<Handle>,
    cursor: usize,
    pending: Vec<(Handle, PendingWrite)>,
    default_lifetime_s: i64,
}

impl RegistrationManager {
    /// Create a manager over an already-populated registry.
    pub fn new(
        registry: ServerRegistry,
        window: BootstrapWindow,
        default_lifetime_s: i64,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            window,
            scheduler: RetryScheduler::new(),
            mode: Mode::Operational,
            state: SessionState::Idle,
            order: Vec::new(),
            cursor: 0,
            pending: Vec::new(),
            default_lifetime_s,
        }
    }

    /// Validate a configuration and build a manager from it.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        validate(config).map_err(ConfigError::Invalid)?;
        let registry = config.build_registry()?;
        Ok(Self::new(
            registry,
            config.bootstrap_window(),
            config.client.lifetime_s,
        ))
    }

    /// Begin the first attempt sequence.
    ///
    /// Prefers operational entries; falls back to bootstrap when none are
    /// configured; gives up immediately on an empty registry.
    pub fn start(&mut self, now: Instant) {
        let (has_operational, has_bootstrap) = {
            let registry = self.registry.read();
            (registry.has_operational(), registry.has_bootstrap())
        };
        if has_operational {
            self.enter_operational(now);
        } else if has_bootstrap {
            self.enter_bootstrap(now);
        } else {
            info!("no servers configured; nothing to attempt");
            self.state = SessionState::GaveUp;
        }
    }

    /// Current mode (bootstrap vs. operational).
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// Retry counters for observability.
    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Hand out a read-only registry view for remote-read collaborators.
    pub fn reader(&self) -> RegistryReader {
        RegistryReader(Arc::clone(&self.registry))
    }

    /// The entry the scheduler currently considers active, if an attempt is
    /// due or outstanding.
    pub fn current_target(&self) -> Option<ConnectTarget> {
        if !self.state.attempt_outstanding() {
            return None;
        }
        let handle = *self.order.get(self.cursor)?;
        let registry = self.registry.read();
        let entry = registry.get(handle)?;
        Some(ConnectTarget {
            handle,
            ssid: entry.ssid(),
            uri: entry.uri().to_string(),
            binding_mode: entry.binding_mode().to_string(),
            sni: entry.sni().map(str::to_string),
            lifetime_s: if entry.lifetime_s() == UNDEFINED_LIFETIME {
                self.default_lifetime_s
            } else {
                entry.lifetime_s()
            },
            credentials: entry.credentials().clone(),
        })
    }

    /// Feed a transport outcome into the state machine.
    pub fn on_attempt_result(&mut self, result: AttemptResult, now: Instant) {
        match self.state {
            SessionState::OperationalAttempt { .. } | SessionState::BootstrapInProgress => {}
            SessionState::Registered => {
                if result != AttemptResult::Success {
                    warn!("registration lost; starting a new attempt sequence");
                    self.scheduler.reset();
                    self.begin_sweep(now);
                }
                return;
            }
            _ => {
                debug!(state = ?self.state, "attempt result ignored in current state");
                return;
            }
        }

        match result {
            AttemptResult::Success => match self.mode {
                Mode::Operational => {
                    // The attempt settled; deferred writes apply now.
                    self.apply_pending();
                    self.scheduler.on_success();
                    let handle = self.order.get(self.cursor).copied();
                    info!(?handle, "registration succeeded");
                    self.state = SessionState::Registered;
                }
                Mode::Bootstrap => {
                    // Transport-level success only; the exchange keeps
                    // running under the timeout window and settles via
                    // `on_bootstrap_finished`.
                    debug!("bootstrap transport connected");
                }
            },
            AttemptResult::Failure(reason) => self.handle_failure(now, &reason),
            AttemptResult::Timeout => self.handle_failure(now, "timeout"),
        }
    }

    /// Periodic tick driving holdoff, timeout, retry and sweep-delay expiry.
    pub fn notify_time_dependent(&mut self, now: Instant) {
        match self.state {
            SessionState::RetryWait { .. } if self.state.due(now) => {
                debug!("retry timer expired");
                self.activate_attempt(now);
            }
            SessionState::SweepWait { .. } if self.state.due(now) => {
                debug!("sequence delay expired; starting a new sweep");
                self.begin_sweep(now);
            }
            SessionState::BootstrapHoldoff => {
                if self.window.poll(now) == Some(WindowEvent::HoldoffElapsed) {
                    debug!("bootstrap holdoff elapsed");
                    self.activate_attempt(now);
                }
            }
            SessionState::BootstrapInProgress => {
                if self.window.poll(now) == Some(WindowEvent::TimedOut) {
                    warn!("bootstrap sequence timed out");
                    self.handle_bootstrap_timeout(now);
                }
            }
            _ => {}
        }
    }

    /// Completion signal for the bootstrap exchange.
    pub fn on_bootstrap_finished(&mut self, success: bool, now: Instant) {
        if self.mode != Mode::Bootstrap || self.state != SessionState::BootstrapInProgress {
            warn!(state = ?self.state, "bootstrap completion signal ignored");
            return;
        }
        self.window.cancel();
        if success {
            self.apply_pending();
            self.scheduler.reset();
            if self.registry.read().has_operational() {
                info!("bootstrap complete; switching to operational mode");
                self.enter_operational(now);
            } else {
                warn!("bootstrap complete but no operational entry configured");
                self.state = SessionState::Idle;
            }
        } else {
            self.handle_failure(now, "bootstrap rejected");
        }
    }

    /// Explicit bootstrap-request trigger (e.g. a remote execute).
    pub fn request_bootstrap(&mut self, now: Instant) -> RegResult<()> {
        if !self.registry.read().has_bootstrap() {
            return Err(Error::NotFound);
        }
        info!("bootstrap explicitly requested");
        // Any outstanding attempt is being abandoned; its writes settle.
        self.apply_pending();
        self.enter_bootstrap(now);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registry mutation (object-model instance lifecycle)
    // ------------------------------------------------------------------

    /// Insert a new entry.
    ///
    /// The entry joins the sweep order at the next sweep; a session that had
    /// given up (or never had anything to attempt) starts over immediately.
    pub fn insert_entry(&mut self, entry: ServerEntry, now: Instant) -> RegResult<Handle> {
        let handle = self.registry.write().insert(entry)?;
        if matches!(self.state, SessionState::GaveUp | SessionState::Idle) {
            self.scheduler.reset();
            self.start(now);
        }
        Ok(handle)
    }

    /// Remove an entry, cancelling timers that belonged to it.
    ///
    /// Removing the active entry advances to the next selectable one
    /// without consuming a retry or a sweep.
    pub fn remove_entry(&mut self, handle: Handle, now: Instant) -> RegResult<ServerEntry> {
        let entry = self.registry.write().remove(handle)?;
        self.pending.retain(|(h, _)| *h != handle);

        if let Some(pos) = self.order.iter().position(|h| *h == handle) {
            self.order.remove(pos);
            if pos < self.cursor {
                self.cursor -= 1;
            } else if pos == self.cursor {
                match self.state {
                    SessionState::OperationalAttempt { .. }
                    | SessionState::BootstrapInProgress
                    | SessionState::RetryWait { .. } => {
                        debug!(handle = %handle, "active entry removed; advancing");
                        self.scheduler.reset_attempts();
                        if self.mode == Mode::Bootstrap {
                            self.window.cancel();
                        }
                        if self.order.is_empty() {
                            self.give_up(now);
                        } else {
                            if self.cursor >= self.order.len() {
                                self.cursor = 0;
                            }
                            self.activate_attempt(now);
                        }
                    }
                    SessionState::Registered => {
                        warn!(handle = %handle, "registered server removed");
                        self.state = SessionState::Idle;
                    }
                    // A sweep in waiting re-snapshots its order on resume.
                    _ => {}
                }
            }
        }
        Ok(entry)
    }

    // ------------------------------------------------------------------
    // Resource writes (object-model write path)
    // ------------------------------------------------------------------

    /// Write the connection URI.
    pub fn write_uri(&mut self, handle: Handle, uri: String) -> RegResult<()> {
        if uri.is_empty() {
            return Err(Error::EmptyUri);
        }
        self.apply_or_defer(handle, PendingWrite::Uri(uri))
    }

    /// Write the registration lifetime.
    pub fn write_lifetime(&mut self, handle: Handle, lifetime_s: i64) -> RegResult<()> {
        self.apply_or_defer(handle, PendingWrite::Lifetime(lifetime_s))
    }

    /// Write the binding mode token.
    pub fn write_binding_mode(&mut self, handle: Handle, binding: String) -> RegResult<()> {
        self.apply_or_defer(handle, PendingWrite::BindingMode(binding))
    }

    /// Write the SNI override.
    pub fn write_sni(&mut self, handle: Handle, sni: Option<String>) -> RegResult<()> {
        self.apply_or_defer(handle, PendingWrite::Sni(sni))
    }

    /// Write the extended retry parameters.
    pub fn write_retry(&mut self, handle: Handle, retry: Option<RetryParams>) -> RegResult<()> {
        self.apply_or_defer(handle, PendingWrite::Retry(retry))
    }

    /// Write the security mode resource.
    pub fn write_security_mode(&mut self, handle: Handle, mode: SecurityMode) -> RegResult<()> {
        {
            let registry = self.registry.read();
            let entry = registry.get(handle).ok_or(Error::NotFound)?;
            // Reject impossible transitions up front even when deferring.
            let mut probe = entry.credentials().clone();
            probe.set_mode(mode)?;
        }
        self.apply_or_defer(handle, PendingWrite::SecurityMode(mode))
    }

    /// Write security material. Mode consistency is validated before the
    /// write is accepted, whether it applies now or is deferred.
    pub fn write_credential(&mut self, handle: Handle, write: CredentialWrite) -> RegResult<()> {
        {
            let registry = self.registry.read();
            let entry = registry.get(handle).ok_or(Error::NotFound)?;
            entry.credentials().validate_write(&write)?;
        }
        self.apply_or_defer(handle, PendingWrite::Credential(write))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn targets_active_entry(&self, handle: Handle) -> bool {
        self.state.attempt_outstanding() && self.order.get(self.cursor) == Some(&handle)
    }

    fn apply_or_defer(&mut self, handle: Handle, write: PendingWrite) -> RegResult<()> {
        if self.registry.read().get(handle).is_none() {
            return Err(Error::NotFound);
        }
        if self.targets_active_entry(handle) {
            debug!(handle = %handle, "write deferred until the attempt settles");
            self.pending.push((handle, write));
            return Ok(());
        }
        let mut registry = self.registry.write();
        let entry = registry.get_mut(handle).ok_or(Error::NotFound)?;
        Self::apply_write(entry, write)
    }

    fn apply_write(entry: &mut ServerEntry, write: PendingWrite) -> RegResult<()> {
        match write {
            PendingWrite::Uri(uri) => entry.set_uri(uri),
            PendingWrite::Lifetime(v) => {
                entry.set_lifetime(v);
                Ok(())
            }
            PendingWrite::BindingMode(b) => {
                entry.set_binding_mode(b);
                Ok(())
            }
            PendingWrite::Sni(s) => {
                entry.set_sni(s);
                Ok(())
            }
            PendingWrite::Retry(r) => {
                entry.set_retry(r);
                Ok(())
            }
            PendingWrite::SecurityMode(m) => entry.credentials_mut().set_mode(m),
            PendingWrite::Credential(w) => entry.credentials_mut().apply(w),
        }
    }

    /// Apply queued writes now that no attempt depends on the old values.
    fn apply_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut registry = self.registry.write();
        for (handle, write) in self.pending.drain(..) {
            let Some(entry) = registry.get_mut(handle) else {
                warn!(handle = %handle, "dropping deferred write for removed entry");
                continue;
            };
            if let Err(err) = Self::apply_write(entry, write) {
                warn!(
                    handle = %handle,
                    code = err.error_code(),
                    error = %err,
                    "deferred write failed"
                );
            }
        }
    }

    fn enter_operational(&mut self, now: Instant) {
        self.mode = Mode::Operational;
        self.window.cancel();
        self.scheduler.reset();
        self.begin_sweep(now);
    }

    fn enter_bootstrap(&mut self, now: Instant) {
        self.mode = Mode::Bootstrap;
        self.scheduler.reset();
        self.order = self.registry.read().selectable_handles(Mode::Bootstrap);
        self.cursor = 0;
        if self.order.is_empty() {
            info!("no bootstrap entry selectable; giving up");
            self.window.cancel();
            self.state = SessionState::GaveUp;
            return;
        }
        info!(entries = self.order.len(), "entering bootstrap mode");
        self.window.arm(now);
        if self.window.poll(now) == Some(WindowEvent::HoldoffElapsed) {
            self.activate_attempt(now);
        } else {
            self.state = SessionState::BootstrapHoldoff;
        }
    }

    /// Re-snapshot the selectable order and attempt its first entry.
    fn begin_sweep(&mut self, now: Instant) {
        self.order = self.registry.read().selectable_handles(self.mode);
        self.cursor = 0;
        if self.order.is_empty() {
            self.give_up(now);
            return;
        }
        self.activate_attempt(now);
    }

    /// Make the current cursor entry the outstanding attempt.
    fn activate_attempt(&mut self, now: Instant) {
        match self.mode {
            Mode::Operational => {
                self.state = SessionState::OperationalAttempt {
                    attempt: self.scheduler.attempts_on_current_server(),
                };
            }
            Mode::Bootstrap => {
                self.window.begin_attempt(now);
                self.state = SessionState::BootstrapInProgress;
            }
        }
    }

    fn handle_failure(&mut self, now: Instant, reason: &str) {
        // The attempt settled; deferred writes apply before the next one.
        self.apply_pending();
        if self.mode == Mode::Bootstrap {
            self.window.cancel();
        }

        let Some(&handle) = self.order.get(self.cursor) else {
            self.give_up(now);
            return;
        };
        let params = self
            .registry
            .read()
            .get(handle)
            .map(|e| e.effective_retry())
            .unwrap_or(RetryParams::DISABLED);
        let last_in_sweep = self.cursor + 1 >= self.order.len();
        let decision = self.scheduler.on_failure(params, last_in_sweep);
        debug!(
            mode = self.mode.label(),
            handle = %handle,
            decision = decision.label(),
            reason,
            "attempt failed"
        );
        match decision {
            Decision::RetryNow => self.activate_attempt(now),
            Decision::AdvanceToNextServer => {
                self.cursor += 1;
                self.activate_attempt(now);
            }
            Decision::GiveUp => self.give_up(now),
            waiting => {
                self.state = SessionState::for_decision(
                    self.mode,
                    waiting,
                    self.scheduler.attempts_on_current_server(),
                    now,
                );
            }
        }
    }

    fn handle_bootstrap_timeout(&mut self, now: Instant) {
        if self.registry.read().has_operational() {
            info!("falling back to remaining operational entries");
            self.apply_pending();
            self.enter_operational(now);
        } else {
            // No fallback: the bootstrap entry's own retry policy governs
            // what happens next.
            self.handle_failure(now, "bootstrap timeout");
        }
    }

    fn give_up(&mut self, now: Instant) {
        if self.mode == Mode::Operational && self.registry.read().has_bootstrap() {
            info!("operational servers exhausted; falling back to bootstrap");
            self.enter_bootstrap(now);
            return;
        }
        info!("no reachable server");
        self.window.cancel();
        self.state = SessionState::GaveUp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::BootstrapWindow;
    use std::time::Duration;

    fn manager_with(entries: Vec<ServerEntry>) -> RegistrationManager {
        let mut registry = ServerRegistry::new();
        for entry in entries {
            registry.insert(entry).unwrap();
        }
        let window = BootstrapWindow::new(Duration::ZERO, Some(Duration::from_secs(60)));
        RegistrationManager::new(registry, window, 86_400)
    }

    fn op(ssid: u16) -> ServerEntry {
        ServerEntry::operational(
            ssid,
            format!("coap://server-{ssid}"),
            CredentialStore::nosec(),
        )
    }

    #[test]
    fn test_empty_registry_gives_up_immediately() {
        let mut manager = manager_with(vec![]);
        manager.start(Instant::now());
        assert!(manager.session_state().gave_up());
        assert!(manager.current_target().is_none());
    }

    #[test]
    fn test_start_prefers_operational_entries() {
        let mut manager = manager_with(vec![
            ServerEntry::bootstrap("coaps://bs", CredentialStore::nosec()),
            op(1),
        ]);
        manager.start(Instant::now());
        assert_eq!(manager.mode(), Mode::Operational);
        let target = manager.current_target().unwrap();
        assert_eq!(target.ssid, 1);
    }

    #[test]
    fn test_default_lifetime_applied_to_target() {
        let mut manager = manager_with(vec![op(1)]);
        manager.start(Instant::now());
        assert_eq!(manager.current_target().unwrap().lifetime_s, 86_400);
    }

    #[test]
    fn test_deferred_write_applies_on_settle() {
        let mut manager = manager_with(vec![op(1)]);
        let now = Instant::now();
        manager.start(now);

        let handle = manager.current_target().unwrap().handle;
        manager.write_lifetime(handle, 120).unwrap();

        // The in-flight attempt still observes the old value.
        assert_eq!(manager.current_target().unwrap().lifetime_s, 86_400);

        manager.on_attempt_result(AttemptResult::Success, now);
        assert_eq!(manager.reader().entry(handle).unwrap().lifetime_s(), 120);
    }

    #[test]
    fn test_write_to_inactive_entry_applies_immediately() {
        let mut manager = manager_with(vec![op(1), op(2)]);
        let now = Instant::now();
        manager.start(now);

        let reader = manager.reader();
        let other = reader.find_by_short_id(2).unwrap();
        manager.write_lifetime(other, 42).unwrap();
        assert_eq!(reader.entry(other).unwrap().lifetime_s(), 42);
    }

    #[test]
    fn test_write_unknown_handle_fails() {
        let mut manager = manager_with(vec![op(1)]);
        let now = Instant::now();
        manager.start(now);
        let handle = manager.current_target().unwrap().handle;
        manager.remove_entry(handle, now).unwrap();
        assert_eq!(manager.write_lifetime(handle, 1).unwrap_err(), Error::NotFound);
    }
}
