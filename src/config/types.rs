//! Core config struct definitions.

use super::defaults;
use crate::registry::RetryParams;
use crate::security::SecurityMode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Client-wide settings.
    #[serde(default)]
    pub client: ClientConfig,
    /// Bootstrap window settings.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// Server entry definitions, in registry insertion order.
    #[serde(default, rename = "server")]
    pub servers: Vec<ServerDef>,
}

/// Client-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Endpoint name reported during registration.
    #[serde(default = "defaults::endpoint_name")]
    pub endpoint_name: String,
    /// Default registration lifetime, used by entries that leave theirs
    /// undefined.
    #[serde(default = "defaults::lifetime_s")]
    pub lifetime_s: i64,
    /// Negotiated protocol revision. Extended retry parameters require 1.1.
    #[serde(default = "defaults::lwm2m_version")]
    pub lwm2m_version: ProtocolVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_name: defaults::endpoint_name(),
            lifetime_s: defaults::lifetime_s(),
            lwm2m_version: defaults::lwm2m_version(),
        }
    }
}

/// Protocol revision the client negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProtocolVersion {
    /// LwM2M 1.0: no extended retry parameters.
    #[serde(rename = "1.0")]
    V1_0,
    /// LwM2M 1.1: extended retry and SNI.
    #[serde(rename = "1.1")]
    V1_1,
}

impl ProtocolVersion {
    /// Whether this revision carries extended retry parameters.
    #[inline]
    pub fn supports_retry(self) -> bool {
        matches!(self, Self::V1_1)
    }
}

/// Bootstrap window settings, process-wide.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Minimum delay before initiating a bootstrap attempt. 0 = immediate.
    #[serde(default)]
    pub holdoff_s: i64,
    /// Maximum duration of an in-progress bootstrap exchange. Positive
    /// seconds, or the string `"indefinite"` to wait forever.
    #[serde(default = "defaults::bootstrap_timeout")]
    pub timeout: TimeoutSetting,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            holdoff_s: 0,
            timeout: defaults::bootstrap_timeout(),
        }
    }
}

/// A timeout that is either a positive number of seconds or explicitly
/// unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TimeoutSetting {
    /// Bounded timeout in seconds. Must be positive.
    Seconds(i64),
    /// A keyword; only `"indefinite"` is accepted by validation.
    Keyword(String),
}

impl TimeoutSetting {
    /// The keyword selecting an unbounded timeout.
    pub const INDEFINITE: &'static str = "indefinite";

    /// Whether the unbounded timeout was explicitly requested.
    pub fn is_indefinite(&self) -> bool {
        matches!(self, Self::Keyword(k) if k == Self::INDEFINITE)
    }

    /// Bounded duration, or `None` for an indefinite timeout.
    ///
    /// Only meaningful after validation has accepted the setting.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(s) => Some(Duration::from_secs((*s).max(0) as u64)),
            Self::Keyword(_) => None,
        }
    }
}

/// One server entry definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDef {
    /// Connection target URI. Required and non-empty.
    pub uri: String,
    /// Short Server ID. Required for operational entries; ignored for
    /// bootstrap entries, which carry the reserved sentinel.
    #[serde(default)]
    pub short_server_id: Option<u16>,
    /// Whether this is the bootstrap server.
    #[serde(default)]
    pub bootstrap: bool,
    /// Transport binding token.
    #[serde(default = "defaults::binding")]
    pub binding: String,
    /// TLS server-name-indication override.
    #[serde(default)]
    pub sni: Option<String>,
    /// Per-entry registration lifetime; falls back to the client default.
    #[serde(default)]
    pub lifetime_s: Option<i64>,
    /// Security material.
    #[serde(default)]
    pub security: SecurityDef,
    /// Extended retry parameters (LwM2M 1.1 only).
    #[serde(default)]
    pub retry: Option<RetryParams>,
    /// Security object instance id; defaults to the entry's position.
    #[serde(default)]
    pub security_iid: Option<u16>,
    /// Server object instance id; defaults to the entry's position.
    #[serde(default)]
    pub server_iid: Option<u16>,
}

/// Security material definition for one entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityDef {
    /// Security mode. Defaults to `nosec`.
    #[serde(default = "defaults::security_mode")]
    pub mode: SecurityMode,
    /// PSK identity (UTF-8), PSK mode only.
    #[serde(default)]
    pub psk_identity: Option<String>,
    /// Base64-encoded PSK key, PSK mode only.
    #[serde(default)]
    pub psk_key_base64: Option<String>,
    /// PEM file holding the certificate chain (certificate mode) or the
    /// public key (RPK mode).
    #[serde(default)]
    pub public_cert_path: Option<PathBuf>,
    /// PEM file holding the PKCS#8 private key.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// PEM file holding the server's public key for out-of-band validation.
    #[serde(default)]
    pub server_public_key_path: Option<PathBuf>,
    /// External crypto-trust provider references. When present, the entry
    /// uses the structured credential representation and the file/inline
    /// fields above are ignored.
    #[serde(default)]
    pub provider: Option<ProviderDef>,
}

impl Default for SecurityDef {
    fn default() -> Self {
        Self {
            mode: defaults::security_mode(),
            psk_identity: None,
            psk_key_base64: None,
            public_cert_path: None,
            private_key_path: None,
            server_public_key_path: None,
            provider: None,
        }
    }
}

/// Provider-held credential references.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDef {
    /// Certificate chain (or RPK public key) object name.
    #[serde(default)]
    pub certificate_chain: Option<String>,
    /// Private key object name.
    #[serde(default)]
    pub private_key: Option<String>,
    /// PSK identity object name.
    #[serde(default)]
    pub psk_identity: Option<String>,
    /// PSK key object name.
    #[serde(default)]
    pub psk_key: Option<String>,
}
