//! # lwreg
//!
//! Multi-server security and registration retry management for LwM2M
//! clients.
//!
//! The crate holds, per logical server connection, its security material
//! (PSK, raw key pair, or certificate chain), its bootstrap-vs-operational
//! mode, and the retry/backoff schedule governing how registration failures
//! walk across the configured servers before falling back to bootstrap.
//!
//! ## Features
//!
//! - Bounded, insertion-ordered server registry with stable handles
//! - Credential stores owning raw bytes or provider-held references, with
//!   zeroize-on-release secret hygiene
//! - Two-level retry scheduling (per-server retries, cross-server sweeps)
//! - Bootstrap holdoff/timeout windows with no-op-safe cancellation
//! - Tick-driven: no event loop or timer dependency
//! - TOML configuration with validate-at-load
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use lwreg::{
//!     AttemptResult, BootstrapWindow, CredentialStore, RegistrationManager,
//!     RetryParams, ServerEntry, ServerRegistry,
//! };
//!
//! let mut registry = ServerRegistry::new();
//! registry
//!     .insert(
//!         ServerEntry::operational(
//!             1,
//!             "coaps://lwm2m.example.com:5684",
//!             CredentialStore::psk(b"client-01".to_vec(), b"secret".to_vec()).unwrap(),
//!         )
//!         .with_retry(RetryParams {
//!             retry_count: 2,
//!             retry_timer_s: 30,
//!             sequence_retry_count: 1,
//!             sequence_delay_timer_s: 120,
//!         }),
//!     )
//!     .unwrap();
//!
//! let window = BootstrapWindow::new(Duration::ZERO, Some(Duration::from_secs(300)));
//! let mut manager = RegistrationManager::new(registry, window, 86_400);
//!
//! let now = Instant::now();
//! manager.start(now);
//!
//! // The transport asks what to attempt.
//! let target = manager.current_target().expect("an attempt is due");
//! assert_eq!(target.uri, "coaps://lwm2m.example.com:5684");
//!
//! // A failure schedules a retry against the same server in 30 s.
//! manager.on_attempt_result(AttemptResult::Failure("connection refused".into()), now);
//! assert!(manager.current_target().is_none());
//! manager.notify_time_dependent(now + Duration::from_secs(30));
//! assert!(manager.current_target().is_some());
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod schedule;
pub mod security;
pub mod state;

pub use bootstrap::{BootstrapWindow, WindowEvent};
pub use error::{Error, RegResult};
pub use manager::{AttemptResult, ConnectTarget, RegistrationManager, RegistryReader};
pub use registry::{
    BOOTSTRAP_SSID, Handle, MAX_SERVERS, RetryParams, ServerEntry, ServerRegistry,
    UNDEFINED_LIFETIME,
};
pub use schedule::{Decision, RetryScheduler};
pub use security::{
    CredentialMaterial, CredentialRef, CredentialStore, CredentialWrite, RawMaterial, SecretBytes,
    SecurityMode, StructuredMaterial,
};
pub use state::{Mode, SessionState};
