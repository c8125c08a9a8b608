//! Configuration validation.
//!
//! Validates configuration at startup to catch errors early; a bad timeout
//! or credential definition is a load-time failure, never a use-time one.

use super::types::{Config, TimeoutSetting};
use crate::registry::{BOOTSTRAP_SSID, MAX_SERVERS};
use crate::security::SecurityMode;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} servers configured, maximum is 1024")]
    TooManyServers(usize),
    #[error("server[{0}].uri is required")]
    MissingUri(usize),
    #[error("server[{0}].short_server_id is required for operational entries")]
    MissingShortServerId(usize),
    #[error("server[{index}].short_server_id {ssid} is reserved")]
    ReservedShortServerId {
        /// Index of the offending entry definition.
        index: usize,
        /// The reserved id that was configured.
        ssid: u16,
    },
    #[error("short server id {0} configured more than once")]
    DuplicateShortServerId(u16),
    #[error("server[{0}]: psk mode requires psk_identity")]
    MissingPskIdentity(usize),
    #[error("server[{0}]: psk mode requires psk_key_base64")]
    MissingPskKey(usize),
    #[error("server[{0}]: {1} mode requires public_cert_path")]
    MissingPublicMaterial(usize, &'static str),
    #[error("server[{0}]: {1} mode requires private_key_path")]
    MissingPrivateKey(usize, &'static str),
    #[error("server[{0}]: provider is missing a reference for {1} mode")]
    IncompleteProviderRefs(usize, &'static str),
    #[error("credential file does not exist: {0}")]
    CredentialFileNotFound(String),
    #[error("bootstrap.holdoff_s must be >= 0, got {0}")]
    NegativeHoldoff(i64),
    #[error("bootstrap.timeout must be positive or \"indefinite\", got {0}")]
    NonPositiveBootstrapTimeout(i64),
    #[error("unknown bootstrap.timeout keyword: {0:?}")]
    UnknownTimeoutKeyword(String),
    #[error("server[{0}].retry requires lwm2m_version = \"1.1\"")]
    RetryRequiresLwm2m11(usize),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.servers.len() > MAX_SERVERS {
        errors.push(ValidationError::TooManyServers(config.servers.len()));
    }

    // Bootstrap window
    if config.bootstrap.holdoff_s < 0 {
        errors.push(ValidationError::NegativeHoldoff(config.bootstrap.holdoff_s));
    }
    match &config.bootstrap.timeout {
        TimeoutSetting::Seconds(s) if *s <= 0 => {
            errors.push(ValidationError::NonPositiveBootstrapTimeout(*s));
        }
        TimeoutSetting::Keyword(k) if k != TimeoutSetting::INDEFINITE => {
            errors.push(ValidationError::UnknownTimeoutKeyword(k.clone()));
        }
        _ => {}
    }

    let mut seen_ssids: HashSet<u16> = HashSet::new();
    for (index, def) in config.servers.iter().enumerate() {
        if def.uri.is_empty() {
            errors.push(ValidationError::MissingUri(index));
        }

        if !def.bootstrap {
            match def.short_server_id {
                None => errors.push(ValidationError::MissingShortServerId(index)),
                Some(ssid) if ssid == 0 || ssid == BOOTSTRAP_SSID => {
                    errors.push(ValidationError::ReservedShortServerId { index, ssid });
                }
                Some(ssid) => {
                    if !seen_ssids.insert(ssid) {
                        errors.push(ValidationError::DuplicateShortServerId(ssid));
                    }
                }
            }
        }

        if def.retry.is_some() && !config.client.lwm2m_version.supports_retry() {
            errors.push(ValidationError::RetryRequiresLwm2m11(index));
        }

        validate_security(index, def, &mut errors);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_security(
    index: usize,
    def: &super::types::ServerDef,
    errors: &mut Vec<ValidationError>,
) {
    let sec = &def.security;
    let mode_label = sec.mode.label();

    if let Some(provider) = &sec.provider {
        let complete = match sec.mode {
            SecurityMode::NoSec => true,
            SecurityMode::PreSharedKey => {
                provider.psk_identity.is_some() && provider.psk_key.is_some()
            }
            SecurityMode::RawPublicKey | SecurityMode::Certificate => {
                provider.certificate_chain.is_some() && provider.private_key.is_some()
            }
        };
        if !complete {
            errors.push(ValidationError::IncompleteProviderRefs(index, mode_label));
        }
        return;
    }

    match sec.mode {
        SecurityMode::NoSec => {}
        SecurityMode::PreSharedKey => {
            if sec.psk_identity.as_deref().unwrap_or("").is_empty() {
                errors.push(ValidationError::MissingPskIdentity(index));
            }
            if sec.psk_key_base64.as_deref().unwrap_or("").is_empty() {
                errors.push(ValidationError::MissingPskKey(index));
            }
        }
        SecurityMode::RawPublicKey | SecurityMode::Certificate => {
            match &sec.public_cert_path {
                None => errors.push(ValidationError::MissingPublicMaterial(index, mode_label)),
                Some(path) => check_file(path, errors),
            }
            match &sec.private_key_path {
                None => errors.push(ValidationError::MissingPrivateKey(index, mode_label)),
                Some(path) => check_file(path, errors),
            }
            if let Some(path) = &sec.server_public_key_path {
                check_file(path, errors);
            }
        }
    }
}

fn check_file(path: &Path, errors: &mut Vec<ValidationError>) {
    if !path.exists() {
        errors.push(ValidationError::CredentialFileNotFound(
            path.display().to_string(),
        ));
    }
}
