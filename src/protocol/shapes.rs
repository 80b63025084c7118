//! Versioned adapters for the authority's historical response shapes.
//!
//! Each known shape has one normalization function; a cheap check on a
//! distinguishing field selects it. Everything converges on [`AuthorityReply`].

use crate::protocol::models::{AuthorityReply, Verdict, WireShape};
use crate::protocol::timestamps::{derive_expiry, first_active_activation, first_of};
use serde_json::{Map, Value};

/// Status strings that mark a license as revoked or blacklisted.
pub const REVOKE_MARKERS: &[&str] = &["revoked", "blacklisted", "blocked", "banned"];

const STATUS_KEYS: &[&str] = &["status", "license_status", "licenseStatus", "code"];
const REVOKE_FLAGS: &[&str] = &["revoked", "blacklisted"];
const V2_EXPIRY_KEYS: &[&str] = &["expiresAt", "expires_at"];
const LEGACY_EXPIRY_KEYS: &[&str] = &["exp", "expires_at", "expiresAt"];
const LEGACY_PROBE_KEYS: &[&str] = &["ok", "activation_token", "exp", "valid"];

/// Detect the wire generation of a response body.
pub fn detect_shape(body: &Value) -> WireShape {
    let Some(obj) = body.as_object() else {
        return WireShape::Unrecognized;
    };
    if obj.contains_key("success") {
        WireShape::LmfwcV2
    } else if LEGACY_PROBE_KEYS.iter().any(|key| obj.contains_key(*key)) {
        WireShape::Legacy
    } else {
        WireShape::Unrecognized
    }
}

/// Parse a raw body; an empty or non-JSON body reads as `{}`.
pub fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Normalize an authority response into the internal model.
pub fn normalize(http_status: u16, body: Value) -> AuthorityReply {
    let http_ok = (200..300).contains(&http_status);
    let shape = detect_shape(&body);
    let mut reply = match shape {
        WireShape::LmfwcV2 => normalize_lmfwc_v2(http_ok, &body),
        WireShape::Legacy => normalize_legacy(http_ok, &body),
        WireShape::Unrecognized => Normalized {
            verdict: Verdict::Ambiguous,
            token: None,
            expires_at: None,
            message: body
                .as_object()
                .and_then(|obj| string_field(obj, &["message"])),
        },
    };

    if is_revoked(&body) {
        reply.verdict = Verdict::Revoked;
    }

    AuthorityReply {
        shape,
        verdict: reply.verdict,
        token: reply.token,
        expires_at: reply.expires_at,
        message: reply.message,
        http_status,
        raw: body,
    }
}

struct Normalized {
    verdict: Verdict,
    token: Option<String>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    message: Option<String>,
}

/// `{"success": bool, "data": {"activationData": ..., "validFor": n, "createdAt": ...}}`
fn normalize_lmfwc_v2(http_ok: bool, body: &Value) -> Normalized {
    let empty = Map::new();
    let top = body.as_object().unwrap_or(&empty);
    let data = top.get("data").and_then(Value::as_object).unwrap_or(&empty);

    let verdict = match top.get("success").and_then(Value::as_bool) {
        Some(true) if http_ok => Verdict::Success,
        Some(false) => Verdict::Failure,
        _ => Verdict::Ambiguous,
    };

    // Activation returns a single object; validate returns the list.
    let token = match data.get("activationData") {
        Some(Value::Object(activation)) => string_field(activation, &["token"]),
        Some(Value::Array(_)) => {
            first_active_activation(data).and_then(|record| string_field(record, &["token"]))
        }
        _ => None,
    };

    Normalized {
        verdict,
        token,
        expires_at: derive_expiry(data, V2_EXPIRY_KEYS)
            .or_else(|| derive_expiry(top, V2_EXPIRY_KEYS)),
        message: string_field(top, &["message"])
            .or_else(|| string_field(data, &["message"]))
            .or_else(|| string_field(top, &["status"])),
    }
}

/// `{"ok": bool, "activation_token": "...", "exp": <absolute>}`
fn normalize_legacy(http_ok: bool, body: &Value) -> Normalized {
    let empty = Map::new();
    let top = body.as_object().unwrap_or(&empty);

    let discriminator = top
        .get("ok")
        .and_then(Value::as_bool)
        .or_else(|| top.get("valid").and_then(Value::as_bool));
    let verdict = match discriminator {
        Some(true) if http_ok => Verdict::Success,
        Some(false) => Verdict::Failure,
        _ => Verdict::Ambiguous,
    };

    Normalized {
        verdict,
        token: string_field(top, &["activation_token", "token"]),
        expires_at: derive_expiry(top, LEGACY_EXPIRY_KEYS),
        message: string_field(top, &["message", "status"]),
    }
}

/// Whether the body carries a revoke/blacklist marker at the top level or under `data`.
pub fn is_revoked(body: &Value) -> bool {
    let Some(top) = body.as_object() else {
        return false;
    };
    let data = top.get("data").and_then(Value::as_object);
    std::iter::once(top).chain(data).any(|obj| {
        let flagged = REVOKE_FLAGS
            .iter()
            .any(|flag| obj.get(*flag).and_then(Value::as_bool) == Some(true));
        let marked = STATUS_KEYS.iter().any(|key| {
            obj.get(*key)
                .and_then(Value::as_str)
                .map(|s| REVOKE_MARKERS.contains(&s.trim().to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        });
        flagged || marked
    })
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_of(obj, keys)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}
