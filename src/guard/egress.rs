//! Interceptor around the process dispatcher.
//!
//! [`EgressGuard`] wraps whatever transport the [`HttpDispatcher`] holds in a
//! [`GuardedTransport`]. Every call then goes through [`EgressPolicy::check`]:
//!
//! 1. The pinned authority host is always allowed.
//! 2. Otherwise the cached verdict decides; an unknown or stale verdict is
//!    refreshed once through a non-persisting revalidation first.
//! 3. Anything but `valid`/`grace` is rejected and the call is never made.

use crate::client::transport::{HttpDispatcher, OutboundRequest, Transport, TransportResponse};
use crate::clock::Clock;
use crate::manager::LicenseClient;
use crate::policy::gate::RecheckPolicy;
use crate::protocol::models::TrustStatus;
use crate::store::cache::TrustCache;
use crate::TollgateError;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Refreshes the cached verdict without persisting settings.
pub trait Revalidate: Send + Sync {
    /// Revalidate and return the resulting cached status.
    ///
    /// Only fail-closed errors (`DomainViolation`) should be returned; other
    /// failures are expected to leave the cache as it was.
    fn revalidate(&self) -> Result<TrustStatus, TollgateError>;
}

/// Allow/deny decision for outbound calls.
#[derive(Clone)]
pub struct EgressPolicy {
    authority_host: String,
    trust: TrustCache,
    recheck: RecheckPolicy,
    clock: Arc<dyn Clock>,
    revalidator: Option<Weak<dyn Revalidate>>,
}

impl EgressPolicy {
    /// Policy reading `trust`, never refreshing it.
    pub fn new(
        authority_host: &str,
        trust: TrustCache,
        recheck: RecheckPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authority_host: authority_host.to_ascii_lowercase(),
            trust,
            recheck,
            clock,
            revalidator: None,
        }
    }

    /// Refresh unknown or stale verdicts through `revalidator`.
    ///
    /// Held weakly: the revalidator usually sends through the same dispatcher
    /// this policy is installed on.
    pub fn with_revalidator(mut self, revalidator: Weak<dyn Revalidate>) -> Self {
        self.revalidator = Some(revalidator);
        self
    }

    /// Policy bound to a license client's cache, thresholds and clock.
    pub fn for_client(client: &Arc<LicenseClient>) -> Self {
        let weak: Weak<LicenseClient> = Arc::downgrade(client);
        Self::new(
            client.config().authority_host,
            client.trust_cache().clone(),
            client.recheck_policy(),
            client.clock(),
        )
        .with_revalidator(weak)
    }

    /// Pinned authority host.
    pub fn authority_host(&self) -> &str {
        &self.authority_host
    }

    /// Decide whether `request` may leave the process.
    ///
    /// # Errors
    /// - `EgressBlocked` - The license does not permit egress
    /// - `DomainViolation` - Raised by the refresh; never swallowed
    pub fn check(&self, request: &OutboundRequest) -> Result<(), TollgateError> {
        if request.host() == self.authority_host {
            return Ok(());
        }

        let snapshot = self.trust.snapshot();
        let status = if self.recheck.is_stale(&snapshot, self.clock.epoch_seconds()) {
            self.refresh(snapshot.status)?
        } else {
            snapshot.status
        };

        if status.permits() {
            return Ok(());
        }

        warn!(
            method = %request.method,
            url = %request.url,
            status = %status,
            "outbound HTTP call blocked by license policy"
        );
        Err(TollgateError::EgressBlocked {
            method: request.method.to_string(),
            url: request.url.to_string(),
        })
    }

    fn refresh(&self, cached: TrustStatus) -> Result<TrustStatus, TollgateError> {
        match self.revalidator.as_ref().and_then(Weak::upgrade) {
            Some(revalidator) => {
                debug!(cached = %cached, "refreshing stale license verdict");
                revalidator.revalidate()
            }
            None => Ok(cached),
        }
    }
}

impl std::fmt::Debug for EgressPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressPolicy")
            .field("authority_host", &self.authority_host)
            .field("trust", &self.trust)
            .field("recheck", &self.recheck)
            .finish()
    }
}

/// Transport that applies an [`EgressPolicy`] before delegating.
pub struct GuardedTransport {
    inner: Arc<dyn Transport>,
    policy: EgressPolicy,
}

impl GuardedTransport {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn Transport>, policy: EgressPolicy) -> Self {
        Self { inner, policy }
    }
}

impl Transport for GuardedTransport {
    fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError> {
        self.policy.check(&request)?;
        self.inner.send(request)
    }
}

static GLOBAL_GUARD: OnceCell<EgressGuard> = OnceCell::new();

/// Install/uninstall handle for the guard on one dispatcher.
///
/// Install state lives on the dispatcher: whichever handle installs first
/// wins, and any handle's `uninstall` restores the unguarded transport.
pub struct EgressGuard {
    dispatcher: Arc<HttpDispatcher>,
    policy: EgressPolicy,
}

impl EgressGuard {
    /// Guard for `dispatcher`; nothing is installed yet.
    pub fn new(dispatcher: Arc<HttpDispatcher>, policy: EgressPolicy) -> Self {
        Self { dispatcher, policy }
    }

    /// Guard over the client's dispatcher with the client's policy.
    pub fn for_client(client: &Arc<LicenseClient>) -> Self {
        Self::new(client.dispatcher().clone(), EgressPolicy::for_client(client))
    }

    /// The process-wide guard, built from `client` on first call.
    ///
    /// Later calls return the same guard and ignore their argument.
    pub fn global(client: &Arc<LicenseClient>) -> &'static EgressGuard {
        GLOBAL_GUARD.get_or_init(|| Self::for_client(client))
    }

    /// Wrap the dispatcher's transport. Returns `false` if a guard is already installed.
    pub fn install(&self) -> bool {
        let policy = self.policy.clone();
        let installed = self
            .dispatcher
            .intercept(|inner| -> Arc<dyn Transport> { Arc::new(GuardedTransport::new(inner, policy)) });
        if installed {
            info!(authority = %self.policy.authority_host(), "egress guard installed");
        } else {
            debug!("egress guard already installed");
        }
        installed
    }

    /// Restore the original transport. Returns `false` if not installed.
    pub fn uninstall(&self) -> bool {
        let restored = self.dispatcher.restore();
        if restored {
            info!("egress guard uninstalled");
        } else {
            debug!("egress guard not installed");
        }
        restored
    }

    /// Whether a guard is currently installed on the dispatcher.
    pub fn is_installed(&self) -> bool {
        self.dispatcher.is_intercepted()
    }

    /// Policy applied while installed.
    pub fn policy(&self) -> &EgressPolicy {
        &self.policy
    }
}
