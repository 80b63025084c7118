//! Trust status model and the normalized authority reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four-valued trust verdict cached for egress decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    /// Authority confirmed the license.
    Valid,
    /// Degraded trust inside the grace window.
    Grace,
    /// License rejected, revoked or grace exhausted.
    Invalid,
    /// No check has happened since startup.
    #[default]
    Unknown,
}

impl TrustStatus {
    /// Cache representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustStatus::Valid => "valid",
            TrustStatus::Grace => "grace",
            TrustStatus::Invalid => "invalid",
            TrustStatus::Unknown => "unknown",
        }
    }

    /// Parse a cached value; anything unrecognized reads as `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "valid" => TrustStatus::Valid,
            "grace" => TrustStatus::Grace,
            "invalid" => TrustStatus::Invalid,
            _ => TrustStatus::Unknown,
        }
    }

    /// Whether feature use and egress are permitted.
    pub fn permits(&self) -> bool {
        matches!(self, TrustStatus::Valid | TrustStatus::Grace)
    }
}

impl std::fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of the last check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// Last check confirmed validity.
    Valid,
    /// Last check landed in the grace window.
    Grace,
    /// Last check rejected the license.
    Invalid,
    /// Last check could not reach the authority and no grace applied.
    NetworkError,
    /// Never checked.
    #[default]
    Unknown,
}

impl From<TrustStatus> for CheckStatus {
    fn from(status: TrustStatus) -> Self {
        match status {
            TrustStatus::Valid => CheckStatus::Valid,
            TrustStatus::Grace => CheckStatus::Grace,
            TrustStatus::Invalid => CheckStatus::Invalid,
            TrustStatus::Unknown => CheckStatus::Unknown,
        }
    }
}

/// Structural verdict carried by an authority response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Explicit success discriminator.
    Success,
    /// Explicit failure discriminator.
    Failure,
    /// Revoke or blacklist marker; bypasses grace.
    Revoked,
    /// Neither discriminator could be read.
    Ambiguous,
}

/// Known authority response generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// `success` / `data.activationData.token` / `valid_for` duration.
    LmfwcV2,
    /// `ok` / `activation_token` / `exp` absolute.
    Legacy,
    /// No distinguishing field present.
    Unrecognized,
}

/// Authority response normalized into the internal model.
#[derive(Debug, Clone)]
pub struct AuthorityReply {
    /// Detected wire generation.
    pub shape: WireShape,
    /// Structural verdict.
    pub verdict: Verdict,
    /// Activation token, if the response carried one.
    pub token: Option<String>,
    /// Absolute license expiry, explicit or derived.
    pub expires_at: Option<DateTime<Utc>>,
    /// Human-readable server message.
    pub message: Option<String>,
    /// HTTP status of the response.
    pub http_status: u16,
    /// Raw JSON body.
    pub raw: Value,
}
