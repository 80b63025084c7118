//! Tollgate configuration.

use crate::TollgateError;
use std::time::Duration;

/// Environment variable consulted first for the authority consumer key.
pub const ENV_CONSUMER_KEY: &str = "LMFWC_CONSUMER_KEY";

/// Environment variable consulted first for the authority consumer secret.
pub const ENV_CONSUMER_SECRET: &str = "LMFWC_CONSUMER_SECRET";

/// Upper bound for per-request timeouts against the authority.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How the grace window is anchored when the authority fails or is unreachable.
///
/// Exactly one strategy is authoritative per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraceAnchor {
    /// Anchor on the last server-confirmed valid response plus
    /// [`TollgateConfig::last_ok_grace_days`].
    #[default]
    LastConfirmed,

    /// Anchor on the license expiry plus the settings' `billing_grace_days`,
    /// frozen by a grace lock the first time grace is entered.
    Expiry,
}

/// HTTP Basic credentials for the licensing authority.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsumerCredentials {
    /// Consumer key (Basic auth user).
    pub key: String,
    /// Consumer secret (Basic auth password).
    pub secret: String,
}

impl ConsumerCredentials {
    /// Build credentials, returning `None` if either half is blank.
    pub fn new(key: &str, secret: &str) -> Option<Self> {
        let (key, secret) = (key.trim(), secret.trim());
        if key.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var(ENV_CONSUMER_KEY).ok()?;
        let secret = std::env::var(ENV_CONSUMER_SECRET).ok()?;
        Self::new(&key, &secret)
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for Tollgate license enforcement.
///
/// Product constants should be hard-coded in the application, not read
/// from the environment, so the pinned authority cannot be redirected.
#[derive(Debug, Clone)]
pub struct TollgateConfig {
    /// Application name (e.g., "helpdesk")
    pub app_name: &'static str,

    /// Product identifier sent to the authority with every request.
    pub product_id: &'static str,

    /// Pinned licensing authority host (no scheme, no path).
    /// SECURITY: This should be hard-coded in your application, not from environment.
    pub authority_host: &'static str,

    /// Base path of the license REST API on the authority.
    pub api_base_path: &'static str,

    /// User-Agent product identifier.
    pub user_agent_product: &'static str,

    /// Namespace for the TrustCache keys.
    pub cache_namespace: &'static str,

    /// Namespace for the settings document and audit log on disk.
    pub storage_namespace: &'static str,

    /// Timeout applied to every outbound licensing call.
    pub request_timeout: Duration,

    /// Grace anchoring strategy.
    pub grace_anchor: GraceAnchor,

    /// Fixed grace days used by [`GraceAnchor::LastConfirmed`].
    pub last_ok_grace_days: i64,

    /// Age after which a cached `valid`/`invalid`/`unknown` verdict is refreshed.
    pub recheck_after: Duration,

    /// Age after which a cached `grace` verdict is refreshed.
    pub grace_recheck_after: Duration,

    /// Authority credentials from site configuration (environment wins).
    pub credentials: Option<ConsumerCredentials>,

    /// Application version reported to the authority and the audit trail.
    pub app_version: &'static str,
}

impl TollgateConfig {
    /// Configuration for the given product with the default tolerances.
    pub fn new(app_name: &'static str, product_id: &'static str, authority_host: &'static str) -> Self {
        Self {
            app_name,
            product_id,
            authority_host,
            api_base_path: "/wp-json/lmfwc/v2/licenses",
            user_agent_product: app_name,
            cache_namespace: app_name,
            storage_namespace: app_name,
            request_timeout: Duration::from_secs(15),
            grace_anchor: GraceAnchor::LastConfirmed,
            last_ok_grace_days: 30,
            recheck_after: Duration::from_secs(60 * 60),
            grace_recheck_after: Duration::from_secs(6 * 60 * 60),
            credentials: None,
            app_version: "unknown",
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), TollgateError> {
        if self.authority_host.is_empty() {
            return Err(TollgateError::ConfigError(
                "authority_host cannot be empty".to_string(),
            ));
        }
        if self.authority_host.contains("://") || self.authority_host.contains('/') {
            return Err(TollgateError::ConfigError(format!(
                "authority_host must be a bare host, got {}",
                self.authority_host
            )));
        }
        if self.product_id.is_empty() {
            return Err(TollgateError::ConfigError(
                "product_id cannot be empty".to_string(),
            ));
        }
        if self.cache_namespace.is_empty() || self.storage_namespace.is_empty() {
            return Err(TollgateError::ConfigError(
                "cache_namespace and storage_namespace cannot be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() || self.request_timeout > MAX_REQUEST_TIMEOUT {
            return Err(TollgateError::ConfigError(format!(
                "request_timeout must be within (0, {}s], got {:?}",
                MAX_REQUEST_TIMEOUT.as_secs(),
                self.request_timeout
            )));
        }
        if self.last_ok_grace_days < 0 {
            return Err(TollgateError::ConfigError(
                "last_ok_grace_days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve authority credentials: environment, then config, then settings.
    pub fn resolve_credentials(
        &self,
        stored: Option<&ConsumerCredentials>,
    ) -> Option<ConsumerCredentials> {
        ConsumerCredentials::from_env()
            .or_else(|| self.credentials.clone())
            .or_else(|| stored.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TollgateConfig {
        TollgateConfig::new("helpdesk", "helpdesk-ai", "brvsoftware.com")
    }

    #[test]
    fn test_defaults_validate() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.grace_anchor, GraceAnchor::LastConfirmed);
        assert_eq!(config.last_ok_grace_days, 30);
    }

    #[test]
    fn test_host_with_scheme_rejected() {
        let mut config = test_config();
        config.authority_host = "https://brvsoftware.com";
        assert!(matches!(config.validate(), Err(TollgateError::ConfigError(_))));
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = test_config();
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.request_timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_credentials_are_none() {
        assert!(ConsumerCredentials::new("ck_abc", "  ").is_none());
        assert!(ConsumerCredentials::new("ck_abc", "cs_def").is_some());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = ConsumerCredentials::new("ck_abc", "cs_def").unwrap();
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("ck_abc"));
        assert!(!rendered.contains("cs_def"));
    }

    #[test]
    fn test_stored_credentials_used_last() {
        let config = test_config();
        let stored = ConsumerCredentials::new("ck_stored", "cs_stored").unwrap();
        // Environment is not set under test; config has none, so the stored pair wins.
        if ConsumerCredentials::from_env().is_none() {
            assert_eq!(config.resolve_credentials(Some(&stored)), Some(stored));
        }
    }
}
