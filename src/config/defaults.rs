//! Default values for configuration fields.

use super::types::{ProtocolVersion, TimeoutSetting};
use crate::security::SecurityMode;

pub(super) fn endpoint_name() -> String {
    "urn:dev:os:lwreg-client".to_string()
}

pub(super) fn lifetime_s() -> i64 {
    86_400
}

pub(super) fn lwm2m_version() -> ProtocolVersion {
    ProtocolVersion::V1_1
}

pub(super) fn binding() -> String {
    "U".to_string()
}

pub(super) fn bootstrap_timeout() -> TimeoutSetting {
    TimeoutSetting::Seconds(300)
}

pub(super) fn security_mode() -> SecurityMode {
    SecurityMode::NoSec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifetime_is_one_day() {
        assert_eq!(lifetime_s(), 86_400);
    }

    #[test]
    fn test_default_version_supports_retry() {
        assert!(lwm2m_version().supports_retry());
    }

    #[test]
    fn test_default_bootstrap_timeout_is_bounded() {
        assert!(!bootstrap_timeout().is_indefinite());
    }
}
