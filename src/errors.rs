//! Tollgate error types.

use thiserror::Error;

/// Errors that can occur while enforcing the license.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout, connection failure or unreadable body talking to the authority.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request target or final response host is not the pinned authority (fail-closed).
    #[error("Authority domain mismatch: expected {expected}, got {found}")]
    DomainViolation {
        /// The pinned authority host.
        expected: String,
        /// The host actually seen.
        found: String,
    },

    /// No license key was given and none is stored.
    #[error("License key required")]
    MissingLicenseKey,

    /// Reactivation requires a previously stored activation token.
    #[error("No activation token stored; activate first")]
    MissingActivationToken,

    /// Outbound call rejected by the egress guard.
    #[error("HTTP call blocked by license policy: {method} {url}")]
    EgressBlocked {
        /// HTTP method of the blocked call.
        method: String,
        /// Destination URL of the blocked call.
        url: String,
    },

    /// Malformed request or response data.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Settings document could not be read or written.
    #[error("Settings I/O error: {0}")]
    SettingsIO(String),

    /// Audit record could not be written.
    #[error("Audit I/O error: {0}")]
    AuditIO(String),
}

impl TollgateError {
    /// Whether this error must never be swallowed by callers.
    ///
    /// Domain violations indicate active interception and always propagate.
    pub fn is_fail_closed(&self) -> bool {
        matches!(self, TollgateError::DomainViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_violation_is_fail_closed() {
        let err = TollgateError::DomainViolation {
            expected: "brvsoftware.com".to_string(),
            found: "evil.example.com".to_string(),
        };
        assert!(err.is_fail_closed());
        assert!(!TollgateError::Transport("timeout".to_string()).is_fail_closed());
    }

    #[test]
    fn egress_blocked_names_method_and_url() {
        let err = TollgateError::EgressBlocked {
            method: "POST".to_string(),
            url: "https://hooks.example.com/ticket".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP call blocked by license policy: POST https://hooks.example.com/ticket"
        );
    }
}
