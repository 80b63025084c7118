//! Timestamp parsing and expiry derivation shared by both wire shapes.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Keys carrying a validity duration in days.
pub const DURATION_KEYS: &[&str] = &["valid_for", "validFor", "valid_days", "validDays"];

/// Keys carrying the license creation timestamp.
pub const CREATED_KEYS: &[&str] = &["createdAt", "created_at", "issued_at", "issuedAt"];

/// Keys carrying the activation list.
pub const ACTIVATION_KEYS: &[&str] = &["activationData", "activations"];

const ACTIVATED_AT_KEYS: &[&str] = &["activated_at", "activatedAt", "created_at"];

/// Parse a timestamp given as RFC 3339, naive UTC datetime, date, or epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// String form of [`parse_timestamp`].
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Read a day count given as a number or numeric string.
pub fn parse_days(value: &Value) -> Option<i64> {
    let days = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    days.filter(|days| *days > 0)
}

/// First value among `keys` that is not null, `false` or an empty string.
pub fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| is_present(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// `at + days`, or `None` when the result leaves chrono's range.
pub fn add_days(at: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|delta| at.checked_add_signed(delta))
}

/// Absolute expiry from a creation timestamp plus a duration in days.
pub fn expiry_from_duration(created: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    add_days(created, days)
}

/// Derive the license expiry from a response object.
///
/// Order: an explicit expiry field from `explicit_keys`; otherwise the
/// validity duration added to the creation timestamp; otherwise the
/// duration added to the first active activation's `activated_at`.
pub fn derive_expiry(obj: &Map<String, Value>, explicit_keys: &[&str]) -> Option<DateTime<Utc>> {
    if let Some(explicit) = first_of(obj, explicit_keys) {
        return parse_timestamp(explicit);
    }

    let days = first_of(obj, DURATION_KEYS).and_then(parse_days)?;

    if let Some(created) = first_of(obj, CREATED_KEYS).and_then(parse_timestamp) {
        return expiry_from_duration(created, days);
    }

    let activated = first_active_activation(obj)
        .and_then(|activation| first_of(activation, ACTIVATED_AT_KEYS))
        .and_then(parse_timestamp)?;
    expiry_from_duration(activated, days)
}

/// The first activation record without `deactivated_at`, else the first record.
pub fn first_active_activation(obj: &Map<String, Value>) -> Option<&Map<String, Value>> {
    let list = first_of(obj, ACTIVATION_KEYS)?.as_array()?;
    let records: Vec<&Map<String, Value>> = list.iter().filter_map(Value::as_object).collect();
    records
        .iter()
        .find(|record| record.get("deactivated_at").map_or(true, Value::is_null))
        .or_else(|| records.first())
        .copied()
}
