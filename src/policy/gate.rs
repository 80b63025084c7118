//! Freshness of the cached trust verdict.

use crate::config::TollgateConfig;
use crate::protocol::models::TrustStatus;
use crate::store::cache::TrustSnapshot;
use std::time::Duration;

/// When a cached verdict must be refreshed before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecheckPolicy {
    /// Maximum age of a `valid`/`invalid` verdict.
    pub recheck_after: Duration,
    /// Maximum age of a `grace` verdict.
    pub grace_recheck_after: Duration,
}

impl RecheckPolicy {
    /// Thresholds from config.
    pub fn from_config(config: &TollgateConfig) -> Self {
        Self {
            recheck_after: config.recheck_after,
            grace_recheck_after: config.grace_recheck_after,
        }
    }

    /// `unknown` is always stale; otherwise the age is compared against the
    /// threshold for the cached status.
    pub fn is_stale(&self, snapshot: &TrustSnapshot, now_epoch: i64) -> bool {
        let age = now_epoch.saturating_sub(snapshot.last_check_ts);
        let limit = match snapshot.status {
            TrustStatus::Unknown => return true,
            TrustStatus::Grace => self.grace_recheck_after,
            TrustStatus::Valid | TrustStatus::Invalid => self.recheck_after,
        };
        age > i64::try_from(limit.as_secs()).unwrap_or(i64::MAX)
    }
}
