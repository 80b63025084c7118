//! Durable license settings document and its stores.
//!
//! The file store keeps a single JSON document under
//! `dirs::data_dir()/<namespace>/license_settings.json`, written with
//! temp file + rename so a crash never leaves a torn document.

use crate::config::ConsumerCredentials;
use crate::protocol::models::CheckStatus;
use crate::TollgateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Upper bound for `billing_grace_days`.
pub const MAX_BILLING_GRACE_DAYS: i64 = 30;

const SETTINGS_FILE: &str = "license_settings.json";

/// Clamp a grace-days input into `[0, MAX_BILLING_GRACE_DAYS]`.
pub fn clamp_grace_days(days: i64) -> i64 {
    days.clamp(0, MAX_BILLING_GRACE_DAYS)
}

fn deserialize_clamped_days<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(clamp_grace_days(i64::deserialize(deserializer)?))
}

fn default_billing_grace_days() -> i64 {
    MAX_BILLING_GRACE_DAYS
}

/// Grace deadline frozen on first entry into grace.
///
/// Written as one value so it is never partially set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceLock {
    /// `billing_grace_days` at the moment grace was entered.
    pub locked_days: i64,
    /// When grace was entered.
    pub started_on: DateTime<Utc>,
    /// Frozen deadline.
    pub until: DateTime<Utc>,
}

/// Result of changing `billing_grace_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceDaysUpdate {
    /// Stored value (after clamping).
    Applied(i64),
    /// A grace lock is active; the stored value was kept.
    Locked(i64),
}

/// Singleton license settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSettings {
    /// License key entered by the operator.
    pub license_key: String,

    /// Salted SHA-256 of the host identity; generated once.
    pub device_fingerprint: String,

    /// Salt mixed into the device fingerprint.
    pub site_salt: String,

    /// Stable identifier of this installation, copied into audit records.
    pub instance_id: String,

    /// Opaque server-issued activation token.
    pub activation_token: Option<String>,

    /// License expiry, when known.
    pub expires_at: Option<DateTime<Utc>>,

    /// Last server-confirmed valid response.
    pub last_ok_on: Option<DateTime<Utc>>,

    /// Last check attempt.
    pub last_check_on: Option<DateTime<Utc>>,

    /// Outcome of the last check attempt.
    pub last_check_status: CheckStatus,

    /// Days of grace past expiry; always within `[0, 30]`.
    #[serde(
        default = "default_billing_grace_days",
        deserialize_with = "deserialize_clamped_days"
    )]
    pub(crate) billing_grace_days: i64,

    /// Active grace lock, if grace was entered under the expiry strategy.
    pub grace_lock: Option<GraceLock>,

    /// Deadline computed by the most recent grace evaluation.
    pub grace_until: Option<DateTime<Utc>>,

    /// Stored authority consumer key.
    pub consumer_key: Option<String>,

    /// Stored authority consumer secret.
    pub consumer_secret: Option<String>,
}

impl Default for LicenseSettings {
    fn default() -> Self {
        Self {
            license_key: String::new(),
            device_fingerprint: String::new(),
            site_salt: String::new(),
            instance_id: String::new(),
            activation_token: None,
            expires_at: None,
            last_ok_on: None,
            last_check_on: None,
            last_check_status: CheckStatus::Unknown,
            billing_grace_days: default_billing_grace_days(),
            grace_lock: None,
            grace_until: None,
            consumer_key: None,
            consumer_secret: None,
        }
    }
}

impl LicenseSettings {
    /// Configured billing grace, always within `[0, 30]`.
    pub fn billing_grace_days(&self) -> i64 {
        self.billing_grace_days
    }

    /// Change the billing grace; clamped, and refused while a grace lock is active.
    pub fn set_billing_grace_days(&mut self, days: i64) -> GraceDaysUpdate {
        let clamped = clamp_grace_days(days);
        if self.grace_lock.is_some() && clamped != self.billing_grace_days {
            tracing::warn!(
                requested = days,
                kept = self.billing_grace_days,
                "billing_grace_days cannot change while grace is locked"
            );
            return GraceDaysUpdate::Locked(self.billing_grace_days);
        }
        self.billing_grace_days = clamped;
        GraceDaysUpdate::Applied(clamped)
    }

    /// Stored activation token, ignoring blanks.
    pub fn token(&self) -> Option<&str> {
        self.activation_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Stored consumer credentials, if both halves are present.
    pub fn stored_credentials(&self) -> Option<ConsumerCredentials> {
        ConsumerCredentials::new(
            self.consumer_key.as_deref().unwrap_or_default(),
            self.consumer_secret.as_deref().unwrap_or_default(),
        )
    }

    /// Generate the installation id if missing. Returns true if it changed.
    pub fn ensure_instance_id(&mut self) -> bool {
        if !self.instance_id.trim().is_empty() {
            return false;
        }
        self.instance_id = uuid::Uuid::new_v4().to_string();
        true
    }

    /// Record a check attempt.
    pub fn mark_checked(&mut self, status: CheckStatus, at: DateTime<Utc>) {
        self.last_check_on = Some(at);
        self.last_check_status = status;
    }

    /// Record a server-confirmed valid response; clears any grace lock.
    pub fn mark_confirmed(&mut self, at: DateTime<Utc>) {
        self.last_ok_on = Some(at);
        self.mark_checked(CheckStatus::Valid, at);
        self.grace_lock = None;
        self.grace_until = None;
    }
}

/// Settings document store (get singleton / reload / save).
pub trait SettingsStore: Send + Sync {
    /// Load (or reload) the singleton document; a missing document reads as default.
    fn load(&self) -> Result<LicenseSettings, TollgateError>;

    /// Persist the document.
    fn save(&self, settings: &LicenseSettings) -> Result<(), TollgateError>;
}

/// File-based settings store with atomic writes.
pub struct FileSettingsStore {
    /// Directory holding the document.
    dir: PathBuf,
}

impl FileSettingsStore {
    /// Create a store under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str) -> Result<Self, TollgateError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| TollgateError::SettingsIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace))
    }

    /// Create a store in a specific directory.
    pub fn with_path(dir: PathBuf) -> Result<Self, TollgateError> {
        fs::create_dir_all(&dir)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to create settings dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<LicenseSettings, TollgateError> {
        let path = self.path();
        if !path.exists() {
            return Ok(LicenseSettings::default());
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to read settings: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to parse settings: {}", e)))
    }

    fn save(&self, settings: &LicenseSettings) -> Result<(), TollgateError> {
        let target_path = self.path();
        let temp_path = self.dir.join(format!("{}.tmp", SETTINGS_FILE));

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&temp_path, &json)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .map_err(|e| TollgateError::SettingsIO(format!("Failed to rename settings file: {}", e)))?;

        Ok(())
    }
}

/// In-memory settings store.
#[derive(Default)]
pub struct MemorySettingsStore {
    doc: Mutex<LicenseSettings>,
}

impl MemorySettingsStore {
    /// Store seeded with a document.
    pub fn new(settings: LicenseSettings) -> Self {
        Self {
            doc: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<LicenseSettings, TollgateError> {
        let doc = self
            .doc
            .lock()
            .map_err(|_| TollgateError::SettingsIO("settings lock poisoned".to_string()))?;
        Ok(doc.clone())
    }

    fn save(&self, settings: &LicenseSettings) -> Result<(), TollgateError> {
        let mut doc = self
            .doc
            .lock()
            .map_err(|_| TollgateError::SettingsIO("settings lock poisoned".to_string()))?;
        *doc = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_grace_days_clamped() {
        let mut settings = LicenseSettings::default();
        for (input, expected) in [(-5, 0), (0, 0), (12, 12), (30, 30), (999, 30), (i64::MIN, 0)] {
            assert_eq!(
                settings.set_billing_grace_days(input),
                GraceDaysUpdate::Applied(expected)
            );
            assert_eq!(settings.billing_grace_days(), expected);
        }
    }

    #[test]
    fn test_grace_days_clamped_on_load() {
        let settings: LicenseSettings =
            serde_json::from_str(r#"{"billing_grace_days": 400}"#).unwrap();
        assert_eq!(settings.billing_grace_days(), 30);
        let settings: LicenseSettings =
            serde_json::from_str(r#"{"billing_grace_days": -1}"#).unwrap();
        assert_eq!(settings.billing_grace_days(), 0);
        let settings: LicenseSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.billing_grace_days(), 30);
    }

    #[test]
    fn test_grace_days_frozen_while_locked() {
        let mut settings = LicenseSettings::default();
        settings.set_billing_grace_days(10);
        settings.grace_lock = Some(GraceLock {
            locked_days: 10,
            started_on: at(1),
            until: at(11),
        });
        assert_eq!(settings.set_billing_grace_days(25), GraceDaysUpdate::Locked(10));
        assert_eq!(settings.billing_grace_days(), 10);

        settings.mark_confirmed(at(2));
        assert!(settings.grace_lock.is_none());
        assert_eq!(settings.set_billing_grace_days(25), GraceDaysUpdate::Applied(25));
    }

    #[test]
    fn test_blank_token_is_none() {
        let mut settings = LicenseSettings::default();
        settings.activation_token = Some("   ".to_string());
        assert!(settings.token().is_none());
        settings.activation_token = Some("tok".to_string());
        assert_eq!(settings.token(), Some("tok"));
    }

    #[test]
    fn test_instance_id_generated_once() {
        let mut settings = LicenseSettings::default();
        assert!(settings.ensure_instance_id());
        let first = settings.instance_id.clone();
        assert!(!settings.ensure_instance_id());
        assert_eq!(settings.instance_id, first);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSettingsStore::with_path(temp_dir.path().to_path_buf()).unwrap();

        assert_eq!(store.load().unwrap(), LicenseSettings::default());

        let mut settings = LicenseSettings::default();
        settings.license_key = "TEST-KEY-XXXX-1234".to_string();
        settings.expires_at = Some(at(20));
        settings.mark_checked(CheckStatus::Grace, at(5));
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, settings);
        assert!(!temp_dir.path().join("license_settings.json.tmp").exists());
    }

    #[test]
    fn test_file_store_corrupt_document() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        let store = FileSettingsStore::with_path(temp_dir.path().to_path_buf()).unwrap();
        assert!(matches!(store.load(), Err(TollgateError::SettingsIO(_))));
    }

    #[test]
    fn test_memory_store_returns_copies() {
        let store = MemorySettingsStore::default();
        let mut settings = store.load().unwrap();
        settings.license_key = "K".to_string();
        assert!(store.load().unwrap().license_key.is_empty());
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap().license_key, "K");
    }
}
