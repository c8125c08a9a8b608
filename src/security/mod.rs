//! Security material for server connections.
//!
//! Each server entry owns exactly one [`CredentialStore`] holding either raw
//! key/identity/certificate bytes or opaque references into an external
//! crypto-trust provider. The [`SecurityMode`] selects which fields are
//! meaningful and which remote writes are accepted.

mod credentials;

pub use credentials::{
    CredentialMaterial, CredentialRef, CredentialStore, CredentialWrite, RawMaterial, SecretBytes,
    StructuredMaterial,
};

use serde::Deserialize;
use std::fmt;

/// Security mode of a server connection, mutually exclusive per entry.
///
/// The numeric mapping follows the LwM2M Security Object "Security Mode"
/// resource (0 = PSK, 1 = RPK, 2 = Certificate, 3 = NoSec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum SecurityMode {
    /// Pre-shared symmetric key.
    #[serde(rename = "psk")]
    PreSharedKey,
    /// Raw public/private key pair without a certificate chain.
    #[serde(rename = "rpk")]
    RawPublicKey,
    /// X.509 certificate chain plus private key.
    #[serde(rename = "certificate")]
    Certificate,
    /// No transport security.
    #[serde(rename = "nosec")]
    NoSec,
}

impl SecurityMode {
    /// Value of the Security Object "Security Mode" resource.
    #[inline]
    pub fn resource_value(self) -> u8 {
        match self {
            Self::PreSharedKey => 0,
            Self::RawPublicKey => 1,
            Self::Certificate => 2,
            Self::NoSec => 3,
        }
    }

    /// Parse a Security Object resource value.
    pub fn from_resource_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PreSharedKey),
            1 => Some(Self::RawPublicKey),
            2 => Some(Self::Certificate),
            3 => Some(Self::NoSec),
            _ => None,
        }
    }

    /// Static label for log fields.
    pub fn label(self) -> &'static str {
        match self {
            Self::PreSharedKey => "psk",
            Self::RawPublicKey => "rpk",
            Self::Certificate => "certificate",
            Self::NoSec => "nosec",
        }
    }

    /// Whether this mode requires secret key material.
    #[inline]
    pub fn requires_secret(self) -> bool {
        !matches!(self, Self::NoSec)
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_value_round_trip() {
        for mode in [
            SecurityMode::PreSharedKey,
            SecurityMode::RawPublicKey,
            SecurityMode::Certificate,
            SecurityMode::NoSec,
        ] {
            assert_eq!(
                SecurityMode::from_resource_value(mode.resource_value()),
                Some(mode)
            );
        }
        assert_eq!(SecurityMode::from_resource_value(4), None);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(SecurityMode::PreSharedKey.to_string(), "psk");
        assert_eq!(SecurityMode::Certificate.to_string(), "certificate");
    }

    #[test]
    fn test_deserialize_from_config_name() {
        #[derive(Deserialize)]
        struct Probe {
            mode: SecurityMode,
        }
        let probe: Probe = toml::from_str(r#"mode = "rpk""#).unwrap();
        assert_eq!(probe.mode, SecurityMode::RawPublicKey);
    }
}
