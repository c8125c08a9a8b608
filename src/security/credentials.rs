//! Credential stores: owned security material, one per server entry.
//!
//! The original design switched between raw byte buffers and externally
//! validated credential objects at build time; here both representations are
//! variants of [`CredentialMaterial`], chosen once at construction, so every
//! code path handles both.

use crate::error::{Error, RegResult};
use crate::security::SecurityMode;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Secret material
// ============================================================================

/// Owned secret bytes, zeroed on drop.
///
/// Used for private keys and PSK keys so they don't linger in memory after
/// the owning entry is released.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Wrap secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the secret material.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against candidate bytes.
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.0.ct_eq(other).into()
    }

    /// Zero the buffer in place and release it.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print actual content
        f.debug_struct("SecretBytes")
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

// ============================================================================
// Structured credential references
// ============================================================================

/// Opaque name of a validated credential object held by an external
/// crypto-trust provider (trust-store alias, HSM slot, engine query).
///
/// The store never sees the underlying key bytes in this representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialRef(String);

impl CredentialRef {
    /// Wrap a provider reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The provider-side name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Material representations
// ============================================================================

/// Raw byte material owned by the entry.
#[derive(Debug, Clone, Default)]
pub struct RawMaterial {
    /// PSK identity, RPK public key, or DER certificate chain per mode.
    pub public_cert_or_psk_identity: Vec<u8>,
    /// PSK key or private key. Sensitive; zeroed on release.
    pub private_cert_or_psk_key: SecretBytes,
    /// Remote endpoint's public key for out-of-band identity validation.
    pub server_public_key: Option<Vec<u8>>,
}

impl RawMaterial {
    fn is_empty(&self) -> bool {
        self.public_cert_or_psk_identity.is_empty()
            && self.private_cert_or_psk_key.is_empty()
            && self.server_public_key.is_none()
    }

    fn wipe(&mut self) {
        self.public_cert_or_psk_identity.clear();
        self.private_cert_or_psk_key.wipe();
        if let Some(key) = self.server_public_key.as_mut() {
            key.clear();
        }
        self.server_public_key = None;
    }
}

/// Provider-held credential references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredMaterial {
    /// Certificate chain (or RPK public key object).
    pub certificate_chain: Option<CredentialRef>,
    /// Private key object.
    pub private_key: Option<CredentialRef>,
    /// PSK identity object.
    pub psk_identity: Option<CredentialRef>,
    /// PSK key object.
    pub psk_key: Option<CredentialRef>,
}

impl StructuredMaterial {
    fn is_empty(&self) -> bool {
        self.certificate_chain.is_none()
            && self.private_key.is_none()
            && self.psk_identity.is_none()
            && self.psk_key.is_none()
    }
}

/// The representation an entry's credentials use, fixed at construction.
#[derive(Debug, Clone)]
pub enum CredentialMaterial {
    /// Owned byte buffers.
    Raw(RawMaterial),
    /// Opaque provider references.
    Structured(StructuredMaterial),
}

impl CredentialMaterial {
    fn is_empty(&self) -> bool {
        match self {
            Self::Raw(raw) => raw.is_empty(),
            Self::Structured(s) => s.is_empty(),
        }
    }
}

// ============================================================================
// Remote write requests
// ============================================================================

/// A credential write arriving through the object-model layer.
///
/// Each variant maps onto one Security Object resource; the store validates
/// the write against the current [`SecurityMode`] before mutating.
#[derive(Debug, Clone)]
pub enum CredentialWrite {
    /// PSK identity bytes (mode must be PSK).
    PskIdentity(Vec<u8>),
    /// PSK key bytes (mode must be PSK).
    PskKey(SecretBytes),
    /// Public key or certificate chain (RPK or certificate mode).
    PublicKeyOrCertificate(Vec<u8>),
    /// Private key (RPK or certificate mode).
    PrivateKey(SecretBytes),
    /// Remote endpoint's public key (RPK or certificate mode).
    ServerPublicKey(Vec<u8>),
}

impl CredentialWrite {
    /// Resource label for error reporting and log fields.
    pub fn field(&self) -> &'static str {
        match self {
            Self::PskIdentity(_) => "psk_identity",
            Self::PskKey(_) => "psk_key",
            Self::PublicKeyOrCertificate(_) => "public_key_or_certificate",
            Self::PrivateKey(_) => "private_key",
            Self::ServerPublicKey(_) => "server_public_key",
        }
    }
}

// ============================================================================
// Credential store
// ============================================================================

/// Security material for one server entry.
///
/// Lifetime is exactly that of the owning entry; material is never shared
/// across entries. Release wipes owned secret buffers.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    mode: SecurityMode,
    material: CredentialMaterial,
}

impl CredentialStore {
    /// A store for an unsecured connection.
    pub fn nosec() -> Self {
        Self {
            mode: SecurityMode::NoSec,
            material: CredentialMaterial::Raw(RawMaterial::default()),
        }
    }

    /// A raw PSK store. Identity and key must both be non-empty.
    pub fn psk(identity: Vec<u8>, key: Vec<u8>) -> RegResult<Self> {
        let store = Self {
            mode: SecurityMode::PreSharedKey,
            material: CredentialMaterial::Raw(RawMaterial {
                public_cert_or_psk_identity: identity,
                private_cert_or_psk_key: SecretBytes::new(key),
                server_public_key: None,
            }),
        };
        store.check_complete()?;
        Ok(store)
    }

    /// A raw public/private key pair store.
    pub fn raw_public_key(
        public_key: Vec<u8>,
        private_key: Vec<u8>,
        server_public_key: Option<Vec<u8>>,
    ) -> RegResult<Self> {
        let store = Self {
            mode: SecurityMode::RawPublicKey,
            material: CredentialMaterial::Raw(RawMaterial {
                public_cert_or_psk_identity: public_key,
                private_cert_or_psk_key: SecretBytes::new(private_key),
                server_public_key,
            }),
        };
        store.check_complete()?;
        Ok(store)
    }

    /// A certificate-chain store. `chain_der` holds concatenated DER
    /// certificates, leaf first.
    pub fn certificate(
        chain_der: Vec<u8>,
        private_key: Vec<u8>,
        server_public_key: Option<Vec<u8>>,
    ) -> RegResult<Self> {
        let store = Self {
            mode: SecurityMode::Certificate,
            material: CredentialMaterial::Raw(RawMaterial {
                public_cert_or_psk_identity: chain_der,
                private_cert_or_psk_key: SecretBytes::new(private_key),
                server_public_key,
            }),
        };
        store.check_complete()?;
        Ok(store)
    }

    /// A store backed by provider references, validated for the given mode.
    pub fn structured(mode: SecurityMode, material: StructuredMaterial) -> RegResult<Self> {
        let store = Self {
            mode,
            material: CredentialMaterial::Structured(material),
        };
        store.check_complete()?;
        Ok(store)
    }

    /// Current security mode.
    #[inline]
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Whether the store uses provider references instead of raw bytes.
    #[inline]
    pub fn is_structured(&self) -> bool {
        matches!(self.material, CredentialMaterial::Structured(_))
    }

    /// Borrow the material representation.
    pub fn material(&self) -> &CredentialMaterial {
        &self.material
    }

    /// Raw public material (identity, public key, or chain), if raw.
    pub fn public_material(&self) -> Option<&[u8]> {
        match &self.material {
            CredentialMaterial::Raw(raw) => Some(&raw.public_cert_or_psk_identity),
            CredentialMaterial::Structured(_) => None,
        }
    }

    /// Raw secret material, if raw.
    pub fn secret_material(&self) -> Option<&SecretBytes> {
        match &self.material {
            CredentialMaterial::Raw(raw) => Some(&raw.private_cert_or_psk_key),
            CredentialMaterial::Structured(_) => None,
        }
    }

    /// Raw server public key, if raw and present.
    pub fn server_public_key(&self) -> Option<&[u8]> {
        match &self.material {
            CredentialMaterial::Raw(raw) => raw.server_public_key.as_deref(),
            CredentialMaterial::Structured(_) => None,
        }
    }

    /// Validate a write against the current mode without mutating.
    pub fn validate_write(&self, write: &CredentialWrite) -> RegResult<()> {
        // Structured stores take material only through provider references;
        // every raw resource write is a mode mismatch by definition.
        if self.is_structured() {
            return Err(Error::CredentialMismatch {
                mode: self.mode,
                field: write.field(),
            });
        }
        let allowed = match write {
            CredentialWrite::PskIdentity(_) | CredentialWrite::PskKey(_) => {
                self.mode == SecurityMode::PreSharedKey
            }
            CredentialWrite::PublicKeyOrCertificate(_)
            | CredentialWrite::PrivateKey(_)
            | CredentialWrite::ServerPublicKey(_) => matches!(
                self.mode,
                SecurityMode::RawPublicKey | SecurityMode::Certificate
            ),
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::CredentialMismatch {
                mode: self.mode,
                field: write.field(),
            })
        }
    }

    /// Apply a validated write. The entry is unchanged on error.
    pub fn apply(&mut self, write: CredentialWrite) -> RegResult<()> {
        self.validate_write(&write)?;
        let CredentialMaterial::Raw(raw) = &mut self.material else {
            // validate_write rejects structured stores
            return Err(Error::CredentialMismatch {
                mode: self.mode,
                field: write.field(),
            });
        };
        match write {
            CredentialWrite::PskIdentity(bytes)
            | CredentialWrite::PublicKeyOrCertificate(bytes) => {
                raw.public_cert_or_psk_identity = bytes;
            }
            CredentialWrite::PskKey(secret) | CredentialWrite::PrivateKey(secret) => {
                raw.private_cert_or_psk_key.wipe();
                raw.private_cert_or_psk_key = secret;
            }
            CredentialWrite::ServerPublicKey(bytes) => {
                raw.server_public_key = Some(bytes);
            }
        }
        Ok(())
    }

    /// Change the security mode of the entry.
    ///
    /// Allowed only while the store holds no material; a mode flip over live
    /// credentials must go through [`CredentialStore::replace`] so stale
    /// material can never be interpreted under the wrong mode.
    pub fn set_mode(&mut self, new_mode: SecurityMode) -> RegResult<()> {
        if new_mode == self.mode {
            return Ok(());
        }
        if !self.material.is_empty() {
            return Err(Error::InvalidSecurityModeTransition {
                from: self.mode,
                to: new_mode,
            });
        }
        self.mode = new_mode;
        Ok(())
    }

    /// Replace mode and material wholesale (bootstrap write path).
    pub fn replace(&mut self, mode: SecurityMode, material: CredentialMaterial) -> RegResult<()> {
        let candidate = Self { mode, material };
        candidate.check_complete()?;
        self.wipe();
        *self = candidate;
        Ok(())
    }

    /// Wipe all owned material, zeroing secrets in place first.
    pub fn wipe(&mut self) {
        if let CredentialMaterial::Raw(raw) = &mut self.material {
            raw.wipe();
        } else {
            self.material = CredentialMaterial::Structured(StructuredMaterial::default());
        }
    }

    /// Check that populated material is consistent with the mode.
    fn check_complete(&self) -> RegResult<()> {
        let ok = match (&self.material, self.mode) {
            (CredentialMaterial::Raw(raw), SecurityMode::NoSec) => raw.is_empty(),
            (CredentialMaterial::Raw(raw), SecurityMode::PreSharedKey) => {
                !raw.public_cert_or_psk_identity.is_empty()
                    && !raw.private_cert_or_psk_key.is_empty()
            }
            (
                CredentialMaterial::Raw(raw),
                SecurityMode::RawPublicKey | SecurityMode::Certificate,
            ) => {
                !raw.public_cert_or_psk_identity.is_empty()
                    && !raw.private_cert_or_psk_key.is_empty()
            }
            (CredentialMaterial::Structured(s), SecurityMode::NoSec) => s.is_empty(),
            (CredentialMaterial::Structured(s), SecurityMode::PreSharedKey) => {
                s.psk_identity.is_some() && s.psk_key.is_some()
            }
            (
                CredentialMaterial::Structured(s),
                SecurityMode::RawPublicKey | SecurityMode::Certificate,
            ) => s.certificate_chain.is_some() && s.private_key.is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "incomplete credential material for security mode {}",
                self.mode
            )))
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::nosec()
    }
}
