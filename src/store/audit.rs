//! Append-only license audit trail.
//!
//! Writes are best-effort telemetry: a failing sink is logged and ignored,
//! never surfaced to the operation that produced the record.

use crate::TollgateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Maximum characters kept in an audit record's `notes`.
pub const MAX_NOTES_CHARS: usize = 1400;

const AUDIT_FILE: &str = "license_audit.jsonl";

/// License client operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// First activation of this device.
    Activate,
    /// Reactivation with a stored token.
    Reactivate,
    /// Deactivation of this device or the whole account.
    Deactivate,
    /// Periodic or on-demand validation.
    Validate,
}

impl AuditAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Activate => "Activate",
            AuditAction::Reactivate => "Reactivate",
            AuditAction::Deactivate => "Deactivate",
            AuditAction::Validate => "Validate",
        }
    }
}

/// Normalized audit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    /// Success.
    Ok,
    /// Degraded (grace).
    Warn,
    /// Failure.
    Fail,
}

impl AuditStatus {
    /// Normalize a free-form status label.
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "OK" | "SUCCESS" | "VALID" | "ACTIVE" => AuditStatus::Ok,
            "WARN" | "GRACE" | "GRACE_OK" => AuditStatus::Warn,
            _ => AuditStatus::Fail,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "OK",
            AuditStatus::Warn => "WARN",
            AuditStatus::Fail => "FAIL",
        }
    }
}

/// Where the recorded verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSource {
    /// The authority answered.
    Server,
    /// Decided locally (grace evaluation after a failure or outage).
    Local,
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// `"<action> → <status>"`.
    pub subject: String,
    /// Operation.
    pub action: AuditAction,
    /// Normalized outcome.
    pub status: AuditStatus,
    /// Verdict source.
    pub source: AuditSource,
    /// When the operation completed.
    pub event_ts: DateTime<Utc>,
    /// Acting identity, if known.
    pub actor: Option<String>,
    /// `****-****-****-<last4>`.
    pub license_key_mask: String,
    /// Installation id.
    pub instance_id: String,
    /// Application version.
    pub app_version: String,
    /// Size-bounded JSON blob with the raw payload or error.
    pub notes: Option<String>,
}

/// Mask a license key down to its last four characters.
pub fn mask_license_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return String::new();
    }
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****-****-****-{}", tail)
}

/// Serialize `notes` and cut it to [`MAX_NOTES_CHARS`] characters.
pub fn bounded_notes(notes: &Value) -> String {
    let json = notes.to_string();
    match json.char_indices().nth(MAX_NOTES_CHARS) {
        Some((cut, _)) => json[..cut].to_string(),
        None => json,
    }
}

/// Append-only audit sink.
pub trait AuditSink: Send + Sync {
    /// Append a record.
    fn insert(&self, record: &AuditRecord) -> Result<(), TollgateError>;
}

/// Audit sink appending JSON lines to `dirs::data_dir()/<namespace>/license_audit.jsonl`.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    /// Sink under the platform data directory.
    pub fn new(namespace: &str) -> Result<Self, TollgateError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| TollgateError::AuditIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace).join(AUDIT_FILE))
    }

    /// Sink appending to a specific file.
    pub fn with_path(path: PathBuf) -> Result<Self, TollgateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TollgateError::AuditIO(format!("Failed to create audit dir: {}", e)))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn insert(&self, record: &AuditRecord) -> Result<(), TollgateError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| TollgateError::AuditIO(format!("Failed to serialize record: {}", e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TollgateError::AuditIO(format!("Failed to open audit log: {}", e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| TollgateError::AuditIO(format!("Failed to append record: {}", e)))
    }
}

/// In-memory audit sink.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything inserted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn insert(&self, record: &AuditRecord) -> Result<(), TollgateError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// One audit entry waiting to be written.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    /// Operation.
    pub action: AuditAction,
    /// Free-form status label, normalized on write.
    pub status: &'a str,
    /// Verdict source.
    pub source: AuditSource,
    /// License key (masked on write).
    pub license_key: &'a str,
    /// Notes blob.
    pub notes: Value,
}

/// Builds and writes audit records, swallowing sink failures.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    app_version: String,
    actor: Option<String>,
}

impl AuditTrail {
    /// Trail writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>, app_version: &str) -> Self {
        Self {
            sink,
            app_version: app_version.to_string(),
            actor: None,
        }
    }

    /// Same trail, recording `actor` as the acting identity.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Build the record for an entry.
    pub fn build(&self, entry: AuditEntry<'_>, instance_id: &str, now: DateTime<Utc>) -> AuditRecord {
        let status = AuditStatus::normalize(entry.status);
        let notes = if entry.notes.is_null() {
            None
        } else {
            Some(bounded_notes(&entry.notes))
        };
        AuditRecord {
            subject: format!("{} → {}", entry.action.as_str(), status.as_str()),
            action: entry.action,
            status,
            source: entry.source,
            event_ts: now,
            actor: self.actor.clone(),
            license_key_mask: mask_license_key(entry.license_key),
            instance_id: instance_id.to_string(),
            app_version: self.app_version.clone(),
            notes,
        }
    }

    /// Write an entry; failures are logged and discarded.
    pub fn write(&self, entry: AuditEntry<'_>, instance_id: &str, now: DateTime<Utc>) {
        let record = self.build(entry, instance_id, now);
        if let Err(e) = self.sink.insert(&record) {
            warn!(error = %e, subject = %record.subject, "license audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn insert(&self, _record: &AuditRecord) -> Result<(), TollgateError> {
            Err(TollgateError::AuditIO("disk full".to_string()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn entry<'a>(status: &'a str, notes: Value) -> AuditEntry<'a> {
        AuditEntry {
            action: AuditAction::Validate,
            status,
            source: AuditSource::Server,
            license_key: "TEST-KEY-XXXX-1234",
            notes,
        }
    }

    #[test]
    fn test_mask_license_key() {
        assert_eq!(mask_license_key("TEST-KEY-XXXX-1234"), "****-****-****-1234");
        assert_eq!(mask_license_key("ab"), "****-****-****-ab");
        assert_eq!(mask_license_key(""), "");
    }

    #[test]
    fn test_status_normalization() {
        assert_eq!(AuditStatus::normalize("valid"), AuditStatus::Ok);
        assert_eq!(AuditStatus::normalize("Active"), AuditStatus::Ok);
        assert_eq!(AuditStatus::normalize("grace"), AuditStatus::Warn);
        assert_eq!(AuditStatus::normalize("network_error"), AuditStatus::Fail);
        assert_eq!(AuditStatus::normalize(""), AuditStatus::Fail);
    }

    #[test]
    fn test_notes_are_bounded() {
        let long = "é".repeat(5000);
        let notes = bounded_notes(&json!({"raw": long}));
        assert_eq!(notes.chars().count(), MAX_NOTES_CHARS);
        let short = bounded_notes(&json!({"http": 200}));
        assert_eq!(short, r#"{"http":200}"#);
    }

    #[test]
    fn test_record_shape() {
        let sink = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new(sink.clone(), "1.2.3").with_actor("Administrator");
        trail.write(entry("GRACE", json!({"err": "timeout"})), "inst-1", now());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.subject, "Validate → WARN");
        assert_eq!(record.status, AuditStatus::Warn);
        assert_eq!(record.license_key_mask, "****-****-****-1234");
        assert_eq!(record.actor.as_deref(), Some("Administrator"));
        assert_eq!(record.instance_id, "inst-1");
        assert_eq!(record.notes.as_deref(), Some(r#"{"err":"timeout"}"#));
    }

    #[test]
    fn test_broken_sink_is_swallowed() {
        let trail = AuditTrail::new(Arc::new(BrokenSink), "1.0");
        trail.write(entry("OK", Value::Null), "inst", now());
    }

    #[test]
    fn test_jsonl_sink_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit").join("log.jsonl");
        let sink = Arc::new(JsonlAuditSink::with_path(path.clone()).unwrap());
        let trail = AuditTrail::new(sink, "1.0");

        trail.write(entry("OK", json!({"http": 200})), "inst", now());
        trail.write(entry("FAIL", json!({"http": 403})), "inst", now());

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.status, AuditStatus::Fail);
    }
}
