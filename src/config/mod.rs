//! Configuration loading and registry population.
//!
//! This module is split into logical submodules:
//! - [`types`]: config struct definitions (`Config`, `ServerDef`, ...)
//! - [`defaults`]: default value functions
//! - [`validation`]: validate-at-load, collecting all errors found
//!
//! The loader is the startup-time collaborator that turns a TOML file into a
//! populated [`ServerRegistry`]: PSK keys arrive base64-encoded inline,
//! certificate and key material is read from PEM files, and provider-backed
//! entries become structured credential stores.
//!
//! ```
//! use lwreg::config::{self, Config};
//!
//! let cfg: Config = toml::from_str(r#"
//!     [bootstrap]
//!     holdoff_s = 5
//!     timeout = 120
//!
//!     [[server]]
//!     uri = "coaps://lwm2m.example.com:5684"
//!     short_server_id = 1
//!
//!     [server.security]
//!     mode = "psk"
//!     psk_identity = "client-01"
//!     psk_key_base64 = "c2VjcmV0LWtleQ=="
//!
//!     [server.retry]
//!     retry_count = 2
//!     retry_timer_s = 30
//! "#).unwrap();
//!
//! config::validate(&cfg).unwrap();
//! let registry = cfg.build_registry().unwrap();
//! assert_eq!(registry.len(), 1);
//! ```

mod defaults;
mod types;
mod validation;

pub use types::{
    BootstrapConfig, ClientConfig, Config, ProtocolVersion, ProviderDef, SecurityDef, ServerDef,
    TimeoutSetting,
};
pub use validation::{ValidationError, validate};

use crate::bootstrap::BootstrapWindow;
use crate::registry::{ServerEntry, ServerRegistry, UNDEFINED_LIFETIME};
use crate::security::{
    CredentialRef, CredentialStore, SecurityMode, StructuredMaterial,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors from loading configuration and building the registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config or a credential file failed.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation rejected the configuration.
    #[error("configuration validation failed with {} error(s)", .0.len())]
    Invalid(Vec<ValidationError>),
    /// A PEM file held no usable material.
    #[error("bad credential material in {path}: {detail}")]
    Pem {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
    /// An inline PSK key was not valid base64.
    #[error("bad PSK key for server[{index}]: {detail}")]
    PskKey {
        /// Index of the offending entry definition.
        index: usize,
        /// Decode error text.
        detail: String,
    },
    /// Registry population failed (should have been caught by validation).
    #[error(transparent)]
    Registry(#[from] crate::error::Error),
}

/// Load, parse and validate a configuration file.
pub fn load_path(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&text)?;
    validate(&config).map_err(ConfigError::Invalid)?;
    info!(
        path = %path.display(),
        servers = config.servers.len(),
        "configuration loaded"
    );
    Ok(config)
}

impl Config {
    /// Build a populated registry from the server definitions.
    ///
    /// Assumes the configuration has been validated; credential files that
    /// disappeared since validation still surface as [`ConfigError::Io`].
    pub fn build_registry(&self) -> Result<ServerRegistry, ConfigError> {
        let mut registry = ServerRegistry::new();
        for (index, def) in self.servers.iter().enumerate() {
            let credentials = build_credentials(index, def)?;
            let mut entry = if def.bootstrap {
                ServerEntry::bootstrap(def.uri.clone(), credentials)
            } else {
                // Validation guarantees the id is present.
                let ssid = def.short_server_id.ok_or_else(|| {
                    crate::error::Error::Configuration(format!(
                        "server[{index}] missing short_server_id"
                    ))
                })?;
                ServerEntry::operational(ssid, def.uri.clone(), credentials)
            };
            entry = entry
                .with_binding(def.binding.clone())
                .with_lifetime(def.lifetime_s.unwrap_or(UNDEFINED_LIFETIME))
                .with_instance_ids(
                    def.security_iid.unwrap_or(index as u16),
                    def.server_iid.unwrap_or(index as u16),
                );
            if let Some(sni) = &def.sni {
                entry = entry.with_sni(sni.clone());
            }
            if let Some(retry) = def.retry {
                entry = entry.with_retry(retry);
            }
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    /// Build the process-wide bootstrap window from the validated settings.
    pub fn bootstrap_window(&self) -> BootstrapWindow {
        let holdoff = Duration::from_secs(self.bootstrap.holdoff_s.max(0) as u64);
        BootstrapWindow::new(holdoff, self.bootstrap.timeout.as_duration())
    }
}

fn build_credentials(index: usize, def: &ServerDef) -> Result<CredentialStore, ConfigError> {
    let sec = &def.security;

    if let Some(provider) = &sec.provider {
        let material = StructuredMaterial {
            certificate_chain: provider.certificate_chain.as_deref().map(CredentialRef::new),
            private_key: provider.private_key.as_deref().map(CredentialRef::new),
            psk_identity: provider.psk_identity.as_deref().map(CredentialRef::new),
            psk_key: provider.psk_key.as_deref().map(CredentialRef::new),
        };
        return Ok(CredentialStore::structured(sec.mode, material)?);
    }

    match sec.mode {
        SecurityMode::NoSec => Ok(CredentialStore::nosec()),
        SecurityMode::PreSharedKey => {
            let identity = sec.psk_identity.as_deref().unwrap_or("").as_bytes().to_vec();
            let key = STANDARD
                .decode(sec.psk_key_base64.as_deref().unwrap_or(""))
                .map_err(|e| ConfigError::PskKey {
                    index,
                    detail: e.to_string(),
                })?;
            Ok(CredentialStore::psk(identity, key)?)
        }
        SecurityMode::RawPublicKey => {
            let public = load_public_key_der(sec.public_cert_path.as_deref())?;
            let private = load_private_key_der(sec.private_key_path.as_deref())?;
            let server_key = sec
                .server_public_key_path
                .as_deref()
                .map(|p| load_public_key_der(Some(p)))
                .transpose()?;
            Ok(CredentialStore::raw_public_key(public, private, server_key)?)
        }
        SecurityMode::Certificate => {
            let chain = load_cert_chain_der(sec.public_cert_path.as_deref())?;
            let private = load_private_key_der(sec.private_key_path.as_deref())?;
            let server_key = sec
                .server_public_key_path
                .as_deref()
                .map(|p| load_public_key_der(Some(p)))
                .transpose()?;
            Ok(CredentialStore::certificate(chain, private, server_key)?)
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn missing_path() -> ConfigError {
    // Validation reports the precise field; this is a backstop.
    ConfigError::Pem {
        path: PathBuf::new(),
        detail: "no path configured".to_string(),
    }
}

/// Concatenated DER certificates from a PEM file, leaf first.
fn load_cert_chain_der(path: Option<&Path>) -> Result<Vec<u8>, ConfigError> {
    let path = path.ok_or_else(missing_path)?;
    let data = read_file(path)?;
    let mut chain = Vec::new();
    for cert in rustls_pemfile::certs(&mut Cursor::new(&data)) {
        let cert = cert.map_err(|e| ConfigError::Pem {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        chain.extend_from_slice(cert.as_ref());
    }
    if chain.is_empty() {
        return Err(ConfigError::Pem {
            path: path.to_path_buf(),
            detail: "no certificates found".to_string(),
        });
    }
    Ok(chain)
}

/// PKCS#8 private key DER from a PEM file.
fn load_private_key_der(path: Option<&Path>) -> Result<Vec<u8>, ConfigError> {
    let path = path.ok_or_else(missing_path)?;
    let data = read_file(path)?;
    let key = rustls_pemfile::pkcs8_private_keys(&mut Cursor::new(&data))
        .filter_map(|r| r.ok())
        .next()
        .ok_or_else(|| ConfigError::Pem {
            path: path.to_path_buf(),
            detail: "no PKCS#8 private key found".to_string(),
        })?;
    Ok(key.secret_pkcs8_der().to_vec())
}

/// SubjectPublicKeyInfo DER from a PEM file.
fn load_public_key_der(path: Option<&Path>) -> Result<Vec<u8>, ConfigError> {
    let path = path.ok_or_else(missing_path)?;
    let data = read_file(path)?;
    let key = rustls_pemfile::public_keys(&mut Cursor::new(&data))
        .filter_map(|r| r.ok())
        .next()
        .ok_or_else(|| ConfigError::Pem {
            path: path.to_path_buf(),
            detail: "no public key found".to_string(),
        })?;
    Ok(key.as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_orders_entries_as_configured() {
        let config: Config = toml::from_str(
            r#"
[[server]]
uri = "coaps://bs.example.com"
bootstrap = true

[[server]]
uri = "coap://one.example.com"
short_server_id = 10

[[server]]
uri = "coap://two.example.com"
short_server_id = 20
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        let registry = config.build_registry().unwrap();
        let ssids: Vec<u16> = registry.iter().map(|(_, e)| e.ssid()).collect();
        assert_eq!(ssids, vec![crate::registry::BOOTSTRAP_SSID, 10, 20]);
    }

    #[test]
    fn test_psk_key_base64_round_trip() {
        let config: Config = toml::from_str(
            r#"
[[server]]
uri = "coaps://a"
short_server_id = 1

[server.security]
mode = "psk"
psk_identity = "client-01"
psk_key_base64 = "AAECAwQ="
"#,
        )
        .unwrap();
        let registry = config.build_registry().unwrap();
        let (_, entry) = registry.iter().next().unwrap();
        assert!(entry.credentials().secret_material().unwrap().ct_eq(&[0, 1, 2, 3, 4]));
        assert_eq!(entry.credentials().public_material().unwrap(), b"client-01");
    }

    #[test]
    fn test_bad_psk_key_base64_is_rejected() {
        let config: Config = toml::from_str(
            r#"
[[server]]
uri = "coaps://a"
short_server_id = 1

[server.security]
mode = "psk"
psk_identity = "client-01"
psk_key_base64 = "not base64!!!"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.build_registry().unwrap_err(),
            ConfigError::PskKey { index: 0, .. }
        ));
    }

    #[test]
    fn test_provider_backed_entry_is_structured() {
        let config: Config = toml::from_str(
            r#"
[[server]]
uri = "coaps://a"
short_server_id = 1

[server.security]
mode = "certificate"

[server.security.provider]
certificate_chain = "store:device-chain"
private_key = "hsm:slot0"
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        let registry = config.build_registry().unwrap();
        let (_, entry) = registry.iter().next().unwrap();
        assert!(entry.credentials().is_structured());
        assert_eq!(entry.credentials().mode(), SecurityMode::Certificate);
    }

    #[test]
    fn test_bootstrap_window_from_config() {
        let config: Config = toml::from_str("[bootstrap]\nholdoff_s = 7\ntimeout = 60\n").unwrap();
        let mut window = config.bootstrap_window();
        let now = std::time::Instant::now();
        window.arm(now);
        assert_eq!(
            window.holdoff_remaining(now),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_indefinite_timeout_maps_to_none() {
        let config: Config =
            toml::from_str("[bootstrap]\ntimeout = \"indefinite\"\n").unwrap();
        assert_eq!(config.bootstrap.timeout.as_duration(), None);
    }
}
