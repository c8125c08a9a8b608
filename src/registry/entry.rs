//! Server entries: one logical LwM2M server connection each.

use crate::security::CredentialStore;
use serde::Deserialize;
use std::time::Duration;

/// Registration lifetime value meaning "use the protocol default".
pub const UNDEFINED_LIFETIME: i64 = -1;

/// Reserved Short Server ID carried by bootstrap entries.
///
/// Operational entries use 1..=65534; 65535 is reserved by the protocol.
pub const BOOTSTRAP_SSID: u16 = 65535;

/// Communication retry parameters, available from LwM2M 1.1 onwards.
///
/// Counts of 0 mean "no retry, fail immediately". An entry without retry
/// parameters behaves as if all four fields were 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RetryParams {
    /// Re-attempts against the same server after a failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Seconds between attempts against the same server.
    #[serde(default)]
    pub retry_timer_s: u32,
    /// Full sweeps across all selectable servers after one sweep exhausts.
    #[serde(default)]
    pub sequence_retry_count: u32,
    /// Seconds before starting a new sweep.
    #[serde(default)]
    pub sequence_delay_timer_s: u32,
}

impl RetryParams {
    /// Parameters equivalent to an entry without extended retry support.
    pub const DISABLED: RetryParams = RetryParams {
        retry_count: 0,
        retry_timer_s: 0,
        sequence_retry_count: 0,
        sequence_delay_timer_s: 0,
    };

    /// Delay between attempts against the same server.
    pub fn retry_timer(&self) -> Duration {
        Duration::from_secs(u64::from(self.retry_timer_s))
    }

    /// Delay before a new sweep starts.
    pub fn sequence_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.sequence_delay_timer_s))
    }
}

/// One logical server connection: identity, target, mode, and credentials.
///
/// Entries never change their own bootstrap flag at runtime; which entry is
/// active is decided at registry level.
#[derive(Debug, Clone)]
pub struct ServerEntry {
    /// Security object instance this entry correlates with.
    pub security_iid: u16,
    /// Server object instance this entry correlates with.
    pub server_iid: u16,
    short_server_id: u16,
    is_bootstrap: bool,
    uri: String,
    binding_mode: String,
    sni: Option<String>,
    lifetime_s: i64,
    retry: Option<RetryParams>,
    credentials: CredentialStore,
}

impl ServerEntry {
    /// Create an operational entry with the default UDP binding.
    pub fn operational(
        short_server_id: u16,
        uri: impl Into<String>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            security_iid: 0,
            server_iid: 0,
            short_server_id,
            is_bootstrap: false,
            uri: uri.into(),
            binding_mode: "U".to_string(),
            sni: None,
            lifetime_s: UNDEFINED_LIFETIME,
            retry: None,
            credentials,
        }
    }

    /// Create a bootstrap entry. Carries the reserved [`BOOTSTRAP_SSID`].
    pub fn bootstrap(uri: impl Into<String>, credentials: CredentialStore) -> Self {
        Self {
            short_server_id: BOOTSTRAP_SSID,
            is_bootstrap: true,
            ..Self::operational(BOOTSTRAP_SSID, uri, credentials)
        }
    }

    /// Set the binding mode token.
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding_mode = binding.into();
        self
    }

    /// Set the registration lifetime in seconds.
    pub fn with_lifetime(mut self, lifetime_s: i64) -> Self {
        self.lifetime_s = lifetime_s;
        self
    }

    /// Attach extended retry parameters.
    pub fn with_retry(mut self, retry: RetryParams) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the TLS server-name-indication override.
    pub fn with_sni(mut self, sni: impl Into<String>) -> Self {
        self.sni = Some(sni.into());
        self
    }

    /// Set the owning object-model instance identifiers.
    pub fn with_instance_ids(mut self, security_iid: u16, server_iid: u16) -> Self {
        self.security_iid = security_iid;
        self.server_iid = server_iid;
        self
    }

    /// Numeric server identity. [`BOOTSTRAP_SSID`] for bootstrap entries.
    #[inline]
    pub fn ssid(&self) -> u16 {
        self.short_server_id
    }

    /// Whether this is a bootstrap entry.
    #[inline]
    pub fn is_bootstrap(&self) -> bool {
        self.is_bootstrap
    }

    /// Connection target URI. Never empty for a registered entry.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Transport binding token (consumed opaquely by the transport layer).
    #[inline]
    pub fn binding_mode(&self) -> &str {
        &self.binding_mode
    }

    /// TLS server-name-indication override, if any.
    pub fn sni(&self) -> Option<&str> {
        self.sni.as_deref()
    }

    /// Registration lifetime in seconds; [`UNDEFINED_LIFETIME`] for default.
    #[inline]
    pub fn lifetime_s(&self) -> i64 {
        self.lifetime_s
    }

    /// Extended retry parameters, if the protocol revision provides them.
    pub fn retry(&self) -> Option<RetryParams> {
        self.retry
    }

    /// Retry parameters with the no-retry fallback applied.
    pub fn effective_retry(&self) -> RetryParams {
        self.retry.unwrap_or(RetryParams::DISABLED)
    }

    /// Borrow the credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Mutably borrow the credential store (object-model write path).
    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    /// Update the connection URI. Empty URIs are rejected.
    pub fn set_uri(&mut self, uri: impl Into<String>) -> crate::error::RegResult<()> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(crate::error::Error::EmptyUri);
        }
        self.uri = uri;
        Ok(())
    }

    /// Update the registration lifetime.
    pub fn set_lifetime(&mut self, lifetime_s: i64) {
        self.lifetime_s = lifetime_s;
    }

    /// Update the binding mode token.
    pub fn set_binding_mode(&mut self, binding: impl Into<String>) {
        self.binding_mode = binding.into();
    }

    /// Update the SNI override.
    pub fn set_sni(&mut self, sni: Option<String>) {
        self.sni = sni;
    }

    /// Update the extended retry parameters.
    pub fn set_retry(&mut self, retry: Option<RetryParams>) {
        self.retry = retry;
    }
}
