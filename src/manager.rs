//! License Client - the main public API for Tollgate.
//!
//! The `LicenseClient` drives the activation protocol against the pinned
//! licensing authority and turns each answer into a trust verdict:
//! - Activate / reactivate / deactivate this device
//! - Validate with a bounded grace window when the authority fails
//! - Publish the verdict to the shared TrustCache for egress decisions
//! - Append one audit record per operation

use crate::client::http::{AuthorityAction, AuthorityClient};
use crate::client::transport::HttpDispatcher;
use crate::clock::{Clock, SystemClock};
use crate::config::TollgateConfig;
use crate::device::stable_fingerprint;
use crate::guard::Revalidate;
use crate::integrations::scheduler::PeriodicCheck;
use crate::policy::gate::RecheckPolicy;
use crate::policy::grace::{self, GraceInputs};
use crate::protocol::models::{AuthorityReply, CheckStatus, TrustStatus, Verdict};
use crate::store::audit::{AuditAction, AuditEntry, AuditSink, AuditSource, AuditTrail, JsonlAuditSink};
use crate::store::cache::{KeyValueCache, MemoryCache, TrustCache};
use crate::store::settings::{FileSettingsStore, GraceDaysUpdate, LicenseSettings, SettingsStore};
use crate::TollgateError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What an operation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Activation accepted.
    Activated,
    /// Reactivation accepted.
    Reactivated,
    /// Deactivation accepted.
    Deactivated,
    /// Authority confirmed the license.
    Valid,
    /// Authority failed but the grace window holds.
    Grace,
    /// License rejected, revoked, or grace exhausted.
    Invalid,
    /// Authority refused the activation-side request.
    Failed,
    /// Authority unreachable and no grace applied.
    NetworkError,
    /// The scheduler entry point caught an error.
    Exception,
}

impl OutcomeStatus {
    /// Wire/log representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Activated => "activated",
            OutcomeStatus::Reactivated => "reactivated",
            OutcomeStatus::Deactivated => "deactivated",
            OutcomeStatus::Valid => "valid",
            OutcomeStatus::Grace => "grace",
            OutcomeStatus::Invalid => "invalid",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::NetworkError => "network_error",
            OutcomeStatus::Exception => "exception",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a License Client operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseOutcome {
    /// Whether callers may proceed (`grace` counts as ok).
    pub ok: bool,
    /// What happened.
    pub status: OutcomeStatus,
    /// Server-provided message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw authority payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Last server-confirmed valid response (grace outcomes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ok_on: Option<DateTime<Utc>>,
    /// End of the grace window (grace outcomes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_until: Option<DateTime<Utc>>,
    /// Error text for network failures and exceptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LicenseOutcome {
    fn new(ok: bool, status: OutcomeStatus) -> Self {
        Self {
            ok,
            status,
            message: None,
            payload: None,
            last_ok_on: None,
            grace_until: None,
            error: None,
        }
    }

    fn from_reply(ok: bool, status: OutcomeStatus, reply: &AuthorityReply) -> Self {
        Self {
            message: reply.message.clone(),
            payload: Some(reply.raw.clone()),
            ..Self::new(ok, status)
        }
    }

    fn network_error(err: &TollgateError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::new(false, OutcomeStatus::NetworkError)
        }
    }

    fn exception(err: &TollgateError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::new(false, OutcomeStatus::Exception)
        }
    }
}

/// Cached verdict answer for per-request checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateVerdict {
    /// `status` permits use.
    pub ok: bool,
    /// Cached trust status.
    pub status: TrustStatus,
}

/// The three collaborators the client persists through.
#[derive(Clone)]
pub struct LicenseStores {
    /// Durable settings document.
    pub settings: Arc<dyn SettingsStore>,
    /// Process-shared key/value cache backing the TrustCache.
    pub cache: Arc<dyn KeyValueCache>,
    /// Append-only audit sink.
    pub audit: Arc<dyn AuditSink>,
}

impl LicenseStores {
    /// File-backed settings and audit under the storage namespace, in-process cache.
    pub fn on_disk(config: &TollgateConfig) -> Result<Self, TollgateError> {
        Ok(Self {
            settings: Arc::new(FileSettingsStore::new(config.storage_namespace)?),
            cache: Arc::new(MemoryCache::new()),
            audit: Arc::new(JsonlAuditSink::new(config.storage_namespace)?),
        })
    }

    /// Everything in memory.
    pub fn in_memory() -> Self {
        Self {
            settings: Arc::new(crate::store::settings::MemorySettingsStore::default()),
            cache: Arc::new(MemoryCache::new()),
            audit: Arc::new(crate::store::audit::MemoryAuditSink::new()),
        }
    }
}

/// Failed validate awaiting grace evaluation.
enum Fallback<'a> {
    Rejected(&'a AuthorityReply),
    Unreachable(&'a TollgateError),
}

/// Main license client for Tollgate.
///
/// Create one instance per process (usually inside an `Arc`, which the
/// egress guard and the scheduler need) and reuse it.
pub struct LicenseClient {
    config: TollgateConfig,
    clock: Arc<dyn Clock>,
    authority: AuthorityClient,
    dispatcher: Arc<HttpDispatcher>,
    settings: Arc<dyn SettingsStore>,
    trust: TrustCache,
    audit: AuditTrail,
    recheck: RecheckPolicy,
}

impl LicenseClient {
    /// Create a client on the global dispatcher with on-disk stores.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The data directory cannot be created
    pub fn new(config: TollgateConfig) -> Result<Self, TollgateError> {
        let stores = LicenseStores::on_disk(&config)?;
        Self::with_parts(config, stores, HttpDispatcher::global())
    }

    /// Create a client over explicit stores and dispatcher.
    pub fn with_parts(
        config: TollgateConfig,
        stores: LicenseStores,
        dispatcher: Arc<HttpDispatcher>,
    ) -> Result<Self, TollgateError> {
        Self::with_clock(config, stores, dispatcher, Arc::new(SystemClock))
    }

    /// Create a client with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: TollgateConfig,
        stores: LicenseStores,
        dispatcher: Arc<HttpDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TollgateError> {
        Self::with_clock(config, stores, dispatcher, clock)
    }

    fn with_clock(
        config: TollgateConfig,
        stores: LicenseStores,
        dispatcher: Arc<HttpDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TollgateError> {
        config.validate()?;
        let authority = AuthorityClient::new(&config, dispatcher.clone())?;

        Ok(Self {
            trust: TrustCache::new(stores.cache, config.cache_namespace),
            audit: AuditTrail::new(stores.audit, config.app_version),
            recheck: RecheckPolicy::from_config(&config),
            settings: stores.settings,
            config,
            clock,
            authority,
            dispatcher,
        })
    }

    /// Record `actor` as the acting identity on audit records.
    pub fn with_audit_actor(mut self, actor: impl Into<String>) -> Self {
        self.audit = self.audit.with_actor(actor);
        self
    }

    /// Configuration in force.
    pub fn config(&self) -> &TollgateConfig {
        &self.config
    }

    /// Clock used for every timestamp.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Dispatcher the client sends through.
    pub fn dispatcher(&self) -> &Arc<HttpDispatcher> {
        &self.dispatcher
    }

    /// Shared trust verdict.
    pub fn trust_cache(&self) -> &TrustCache {
        &self.trust
    }

    /// Staleness thresholds for the cached verdict.
    pub fn recheck_policy(&self) -> RecheckPolicy {
        self.recheck
    }

    /// Current settings document.
    pub fn settings(&self) -> Result<LicenseSettings, TollgateError> {
        self.settings.load()
    }

    /// Change `billing_grace_days`; clamped to `[0, 30]` and refused while grace is locked.
    pub fn set_billing_grace_days(&self, days: i64) -> Result<GraceDaysUpdate, TollgateError> {
        let mut settings = self.settings.load()?;
        let update = settings.set_billing_grace_days(days);
        if let GraceDaysUpdate::Applied(_) = update {
            self.settings.save(&settings)?;
        }
        Ok(update)
    }

    /// Store a license key for later calls.
    pub fn set_license_key(&self, key: &str) -> Result<(), TollgateError> {
        let mut settings = self.settings.load()?;
        settings.license_key = key.trim().to_string();
        self.settings.save(&settings)
    }

    /// Activate this device.
    ///
    /// # Errors
    /// - `MissingLicenseKey` - No key given and none stored
    /// - `DomainViolation` - Authority host mismatch (nothing is recorded)
    /// - `SettingsIO` - Settings document unavailable
    pub fn activate(&self, license_key: Option<&str>) -> Result<LicenseOutcome, TollgateError> {
        let mut settings = self.settings.load()?;
        let key = resolve_key(license_key, &settings)?;
        let fingerprint = self.ensure_device_fingerprint(&mut settings);
        if settings.ensure_instance_id() {
            info!(instance_id = %settings.instance_id, "generated license instance id");
        }
        self.settings.save(&settings)?;

        let params = [
            ("label", self.device_label(&fingerprint)),
            (
                "meta_data",
                json!({
                    "device_fingerprint": fingerprint,
                    "product_id": self.config.product_id,
                    "app_version": self.config.app_version,
                })
                .to_string(),
            ),
        ];
        let reply = match self.call(AuthorityAction::Activate, &key, &params, &settings) {
            Ok(reply) => reply,
            Err(e) if e.is_fail_closed() => return Err(e),
            Err(e) => return self.record_unreachable(AuditAction::Activate, &key, settings, &e),
        };

        let now = self.clock.now_utc();
        if reply.verdict == Verdict::Success {
            settings.license_key = key.clone();
            if let Some(token) = &reply.token {
                settings.activation_token = Some(token.clone());
            }
            if reply.expires_at.is_some() {
                settings.expires_at = reply.expires_at;
            }
            settings.mark_confirmed(now);
            self.settings.save(&settings)?;
            self.publish(TrustStatus::Valid, now);
            self.audit_reply(AuditAction::Activate, "OK", &key, &reply, &settings, now);
            return Ok(LicenseOutcome::from_reply(true, OutcomeStatus::Activated, &reply));
        }

        self.record_rejected(AuditAction::Activate, &key, settings, &reply, now)
    }

    /// Re-enable the stored activation.
    ///
    /// # Errors
    /// - `MissingLicenseKey` - No key given and none stored
    /// - `MissingActivationToken` - Nothing to reactivate; activate first
    /// - `DomainViolation` - Authority host mismatch
    pub fn reactivate(&self, license_key: Option<&str>) -> Result<LicenseOutcome, TollgateError> {
        let mut settings = self.settings.load()?;
        let key = resolve_key(license_key, &settings)?;
        let token = settings
            .token()
            .map(str::to_string)
            .ok_or(TollgateError::MissingActivationToken)?;

        let params = [
            ("token", token),
            (
                "meta_data",
                json!({
                    "reactivate": true,
                    "product_id": self.config.product_id,
                    "app_version": self.config.app_version,
                })
                .to_string(),
            ),
        ];
        let reply = match self.call(AuthorityAction::Reactivate, &key, &params, &settings) {
            Ok(reply) => reply,
            Err(e) if e.is_fail_closed() => return Err(e),
            Err(e) => return self.record_unreachable(AuditAction::Reactivate, &key, settings, &e),
        };

        let now = self.clock.now_utc();
        if reply.verdict == Verdict::Success {
            if let Some(token) = &reply.token {
                settings.activation_token = Some(token.clone());
            }
            if reply.expires_at.is_some() {
                settings.expires_at = reply.expires_at;
            }
            settings.mark_confirmed(now);
            self.settings.save(&settings)?;
            self.publish(TrustStatus::Valid, now);
            self.audit_reply(AuditAction::Reactivate, "OK", &key, &reply, &settings, now);
            return Ok(LicenseOutcome::from_reply(true, OutcomeStatus::Reactivated, &reply));
        }

        self.record_rejected(AuditAction::Reactivate, &key, settings, &reply, now)
    }

    /// Release this device's activation, or every activation when no token is stored.
    ///
    /// # Errors
    /// - `MissingLicenseKey` - No key given and none stored
    /// - `DomainViolation` - Authority host mismatch
    pub fn deactivate(&self, license_key: Option<&str>) -> Result<LicenseOutcome, TollgateError> {
        let mut settings = self.settings.load()?;
        let key = resolve_key(license_key, &settings)?;
        let params: Vec<(&str, String)> = settings
            .token()
            .map(|token| vec![("token", token.to_string())])
            .unwrap_or_default();

        let reply = match self.call(AuthorityAction::Deactivate, &key, &params, &settings) {
            Ok(reply) => reply,
            Err(e) if e.is_fail_closed() => return Err(e),
            Err(e) => return self.record_unreachable(AuditAction::Deactivate, &key, settings, &e),
        };

        let now = self.clock.now_utc();
        if reply.verdict == Verdict::Success {
            settings.activation_token = None;
            settings.mark_checked(CheckStatus::Invalid, now);
            self.settings.save(&settings)?;
            self.publish(TrustStatus::Invalid, now);
            self.audit_reply(AuditAction::Deactivate, "OK", &key, &reply, &settings, now);
            return Ok(LicenseOutcome::from_reply(true, OutcomeStatus::Deactivated, &reply));
        }

        // A refused deactivation says nothing about validity; the cache is left alone.
        settings.mark_checked(CheckStatus::Invalid, now);
        self.settings.save(&settings)?;
        self.audit_reply(AuditAction::Deactivate, "FAIL", &key, &reply, &settings, now);
        Ok(LicenseOutcome::from_reply(false, OutcomeStatus::Failed, &reply))
    }

    /// Validate the license and publish the verdict.
    ///
    /// With `update_settings = false` only the TrustCache and the audit trail
    /// are written; the settings document is left untouched.
    ///
    /// # Errors
    /// - `MissingLicenseKey` - No key given and none stored
    /// - `DomainViolation` - Authority host mismatch (never routed into grace)
    /// - `SettingsIO` - Settings document unavailable
    pub fn validate(
        &self,
        license_key: Option<&str>,
        update_settings: bool,
    ) -> Result<LicenseOutcome, TollgateError> {
        let mut settings = self.settings.load()?;
        let key = resolve_key(license_key, &settings)?;
        let fingerprint = if update_settings {
            self.ensure_device_fingerprint(&mut settings)
        } else {
            settings.device_fingerprint.clone()
        };

        let mut params = vec![(
            "meta_data",
            json!({
                "device_fingerprint": fingerprint,
                "product_id": self.config.product_id,
                "app_version": self.config.app_version,
            })
            .to_string(),
        )];
        if !fingerprint.is_empty() {
            params.push(("label", self.device_label(&fingerprint)));
        }

        let result = self.call(AuthorityAction::Validate, &key, &params, &settings);
        let now = self.clock.now_utc();
        match result {
            Err(e) if e.is_fail_closed() => {
                error!(error = %e, "license authority domain mismatch; validation aborted");
                Err(e)
            }
            Err(e) => self.fall_back(&key, settings, update_settings, Fallback::Unreachable(&e), now),
            Ok(reply) => match reply.verdict {
                Verdict::Success => {
                    if update_settings {
                        if reply.expires_at.is_some() {
                            settings.expires_at = reply.expires_at;
                        }
                        if let Some(token) = &reply.token {
                            settings.activation_token = Some(token.clone());
                        }
                        settings.mark_confirmed(now);
                        self.settings.save(&settings)?;
                    }
                    self.publish(TrustStatus::Valid, now);
                    self.audit_reply(AuditAction::Validate, "OK", &key, &reply, &settings, now);
                    Ok(LicenseOutcome::from_reply(true, OutcomeStatus::Valid, &reply))
                }
                Verdict::Revoked => {
                    warn!(message = ?reply.message, "license revoked by authority");
                    if update_settings {
                        settings.mark_checked(CheckStatus::Invalid, now);
                        self.settings.save(&settings)?;
                    }
                    self.publish(TrustStatus::Invalid, now);
                    self.audit_reply(AuditAction::Validate, "FAIL", &key, &reply, &settings, now);
                    Ok(LicenseOutcome::from_reply(false, OutcomeStatus::Invalid, &reply))
                }
                Verdict::Failure | Verdict::Ambiguous => {
                    self.fall_back(&key, settings, update_settings, Fallback::Rejected(&reply), now)
                }
            },
        }
    }

    /// Scheduler entry point: validate with the stored key; never returns an error.
    pub fn validate_and_update(&self) -> LicenseOutcome {
        match self.validate(None, true) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "license validation failed");
                LicenseOutcome::exception(&e)
            }
        }
    }

    /// Answer from the cached verdict, refreshing it first when unknown or stale.
    ///
    /// # Errors
    /// Only `DomainViolation` propagates; any other refresh failure keeps the
    /// cached answer.
    pub fn gatekeeper(&self) -> Result<GateVerdict, TollgateError> {
        let snapshot = self.trust.snapshot();
        let status = if self.recheck.is_stale(&snapshot, self.clock.epoch_seconds()) {
            self.refresh_trust()?
        } else {
            snapshot.status
        };
        Ok(GateVerdict {
            ok: status.permits(),
            status,
        })
    }

    /// Non-persisting validate; returns the resulting cached status.
    fn refresh_trust(&self) -> Result<TrustStatus, TollgateError> {
        match self.validate(None, false) {
            Ok(_) => Ok(self.trust.status()),
            Err(e) if e.is_fail_closed() => Err(e),
            Err(e) => {
                warn!(error = %e, "license refresh failed; keeping cached verdict");
                Ok(self.trust.status())
            }
        }
    }

    fn fall_back(
        &self,
        key: &str,
        mut settings: LicenseSettings,
        update_settings: bool,
        fallback: Fallback<'_>,
        now: DateTime<Utc>,
    ) -> Result<LicenseOutcome, TollgateError> {
        let reply_expiry = match &fallback {
            Fallback::Rejected(reply) => reply.expires_at,
            Fallback::Unreachable(_) => None,
        };
        let decision = grace::evaluate(
            GraceInputs {
                strategy: self.config.grace_anchor,
                settings: &settings,
                reply_expiry,
                last_ok_grace_days: self.config.last_ok_grace_days,
            },
            now,
        );

        let mut notes = match &fallback {
            Fallback::Rejected(reply) => json!({"http": reply.http_status, "raw": reply.raw}),
            Fallback::Unreachable(e) => json!({"err": e.to_string()}),
        };
        let mut outcome = match &fallback {
            Fallback::Rejected(reply) => LicenseOutcome::from_reply(false, OutcomeStatus::Invalid, reply),
            Fallback::Unreachable(e) => LicenseOutcome::network_error(e),
        };

        if decision.in_grace {
            if self.trust.status() != TrustStatus::Grace {
                warn!(
                    anchor = ?decision.anchor,
                    grace_until = ?decision.until,
                    "license entered grace window"
                );
            }
            if update_settings {
                if let Some(lock) = decision.new_lock {
                    settings.grace_lock = Some(lock);
                }
                settings.grace_until = decision.until;
                settings.mark_checked(CheckStatus::Grace, now);
                self.settings.save(&settings)?;
            }
            self.publish(TrustStatus::Grace, now);

            notes["last_ok_on"] = json!(settings.last_ok_on);
            notes["grace_until"] = json!(decision.until);
            self.audit.write(
                AuditEntry {
                    action: AuditAction::Validate,
                    status: "GRACE",
                    source: AuditSource::Local,
                    license_key: key,
                    notes,
                },
                &settings.instance_id,
                now,
            );

            outcome.ok = true;
            outcome.status = OutcomeStatus::Grace;
            outcome.last_ok_on = settings.last_ok_on;
            outcome.grace_until = decision.until;
            return Ok(outcome);
        }

        let check_status = match fallback {
            Fallback::Rejected(_) => CheckStatus::Invalid,
            Fallback::Unreachable(_) => CheckStatus::NetworkError,
        };
        if update_settings {
            settings.mark_checked(check_status, now);
            self.settings.save(&settings)?;
        }
        self.publish(TrustStatus::Invalid, now);
        self.audit.write(
            AuditEntry {
                action: AuditAction::Validate,
                status: "FAIL",
                source: AuditSource::Server,
                license_key: key,
                notes,
            },
            &settings.instance_id,
            now,
        );
        Ok(outcome)
    }

    /// Activation-side refusal: cache goes `invalid`.
    fn record_rejected(
        &self,
        action: AuditAction,
        key: &str,
        mut settings: LicenseSettings,
        reply: &AuthorityReply,
        now: DateTime<Utc>,
    ) -> Result<LicenseOutcome, TollgateError> {
        settings.mark_checked(CheckStatus::Invalid, now);
        self.settings.save(&settings)?;
        self.publish(TrustStatus::Invalid, now);
        self.audit_reply(action, "FAIL", key, reply, &settings, now);
        Ok(LicenseOutcome::from_reply(false, OutcomeStatus::Failed, reply))
    }

    /// Activation-side network failure: recorded, never raised, cache untouched.
    fn record_unreachable(
        &self,
        action: AuditAction,
        key: &str,
        mut settings: LicenseSettings,
        err: &TollgateError,
    ) -> Result<LicenseOutcome, TollgateError> {
        let now = self.clock.now_utc();
        warn!(error = %err, "license authority unreachable");
        settings.mark_checked(CheckStatus::NetworkError, now);
        self.settings.save(&settings)?;
        self.audit.write(
            AuditEntry {
                action,
                status: "FAIL",
                source: AuditSource::Server,
                license_key: key,
                notes: json!({"err": err.to_string()}),
            },
            &settings.instance_id,
            now,
        );
        Ok(LicenseOutcome::network_error(err))
    }

    fn call(
        &self,
        action: AuthorityAction,
        key: &str,
        params: &[(&str, String)],
        settings: &LicenseSettings,
    ) -> Result<AuthorityReply, TollgateError> {
        let credentials = self
            .config
            .resolve_credentials(settings.stored_credentials().as_ref());
        self.authority.call(action, key, params, credentials.as_ref())
    }

    fn audit_reply(
        &self,
        action: AuditAction,
        status: &str,
        key: &str,
        reply: &AuthorityReply,
        settings: &LicenseSettings,
        now: DateTime<Utc>,
    ) {
        self.audit.write(
            AuditEntry {
                action,
                status,
                source: AuditSource::Server,
                license_key: key,
                notes: json!({"http": reply.http_status, "raw": reply.raw}),
            },
            &settings.instance_id,
            now,
        );
    }

    /// Write the verdict to the TrustCache, logging transitions.
    fn publish(&self, status: TrustStatus, now: DateTime<Utc>) {
        let previous = self.trust.status();
        self.trust.record(status, now.timestamp());
        if previous != status {
            info!(from = %previous, to = %status, "license trust changed");
        }
    }

    /// Fingerprint from settings, generating (and salting) it on first use.
    fn ensure_device_fingerprint(&self, settings: &mut LicenseSettings) -> String {
        if settings.device_fingerprint.trim().is_empty() {
            if settings.site_salt.trim().is_empty() {
                settings.site_salt = uuid::Uuid::new_v4().simple().to_string();
            }
            settings.device_fingerprint = stable_fingerprint(&settings.site_salt);
            info!("generated device fingerprint");
        }
        settings.device_fingerprint.clone()
    }

    fn device_label(&self, fingerprint: &str) -> String {
        let short: String = fingerprint.chars().take(12).collect();
        format!("{}::{}", self.config.app_name, short)
    }
}

impl Revalidate for LicenseClient {
    fn revalidate(&self) -> Result<TrustStatus, TollgateError> {
        self.refresh_trust()
    }
}

impl PeriodicCheck for LicenseClient {
    fn run_check(&self) {
        let outcome = self.validate_and_update();
        info!(ok = outcome.ok, status = %outcome.status, "scheduled license check");
    }
}

fn resolve_key(given: Option<&str>, settings: &LicenseSettings) -> Result<String, TollgateError> {
    given
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .or_else(|| Some(settings.license_key.trim()).filter(|key| !key.is_empty()))
        .map(str::to_string)
        .ok_or(TollgateError::MissingLicenseKey)
}
