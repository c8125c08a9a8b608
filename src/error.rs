//! Unified error handling for lwreg.
//!
//! This module provides the central error taxonomy for registry and
//! credential mutation, with error-code labels for structured logging.

use crate::security::SecurityMode;
use thiserror::Error;

/// Errors returned by registry and credential mutation paths.
///
/// These are caller errors: the object-model write handler surfaces them
/// as remote write rejections. None of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The registry already holds the maximum number of entries.
    #[error("server registry is full")]
    RegistryFull,

    /// No live entry matches the given handle.
    #[error("entry not found")]
    NotFound,

    /// A non-bootstrap entry with this Short Server ID already exists.
    #[error("short server id {0} already registered")]
    DuplicateShortServerId(u16),

    /// A live entry must always carry a connection URI.
    #[error("server URI must not be empty")]
    EmptyUri,

    /// The requested security mode change conflicts with stored material.
    #[error("cannot change security mode from {from} to {to} while credentials are set")]
    InvalidSecurityModeTransition {
        /// Mode currently in effect for the entry.
        from: SecurityMode,
        /// Mode the write attempted to select.
        to: SecurityMode,
    },

    /// A credential write does not match the entry's security mode.
    #[error("{field} write rejected: entry security mode is {mode}")]
    CredentialMismatch {
        /// Mode currently in effect for the entry.
        mode: SecurityMode,
        /// Resource the write targeted.
        field: &'static str,
    },

    /// Invalid process-wide or per-entry configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RegistryFull => "registry_full",
            Self::NotFound => "not_found",
            Self::DuplicateShortServerId(_) => "duplicate_short_server_id",
            Self::EmptyUri => "empty_uri",
            Self::InvalidSecurityModeTransition { .. } => "invalid_security_mode_transition",
            Self::CredentialMismatch { .. } => "credential_mismatch",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Result type for registry and credential operations.
pub type RegResult<T> = Result<T, Error>;
