//! Grace evaluation.
//!
//! When the authority rejects ambiguously or cannot be reached, a license
//! that was recently proven valid is tolerated for a bounded window. The
//! window is anchored by exactly one [`GraceAnchor`] strategy:
//!
//! - `LastConfirmed`: `last_ok_on + last_ok_grace_days`.
//! - `Expiry`: `expires_at + billing_grace_days`, frozen in a [`GraceLock`]
//!   on first entry so later config changes cannot slide the deadline.
//!
//! A deadline that falls outside the representable time range grants no grace.

use crate::config::GraceAnchor;
use crate::protocol::timestamps::add_days;
use crate::store::settings::{GraceLock, LicenseSettings};
use chrono::{DateTime, Utc};

/// Outcome of a grace evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceDecision {
    /// Whether "now" is inside the window.
    pub in_grace: bool,
    /// Proof-of-validity timestamp the window hangs off.
    pub anchor: Option<DateTime<Utc>>,
    /// Window end, if an anchor exists.
    pub until: Option<DateTime<Utc>>,
    /// Lock to persist; set only on first entry under `Expiry`.
    pub new_lock: Option<GraceLock>,
}

impl GraceDecision {
    fn no_anchor() -> Self {
        Self {
            in_grace: false,
            anchor: None,
            until: None,
            new_lock: None,
        }
    }

    fn out_of_range(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor: Some(anchor),
            ..Self::no_anchor()
        }
    }
}

/// Inputs read from settings and config for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GraceInputs<'a> {
    /// Strategy in force.
    pub strategy: GraceAnchor,
    /// Current settings document.
    pub settings: &'a LicenseSettings,
    /// Expiry carried by the failing response, if any.
    pub reply_expiry: Option<DateTime<Utc>>,
    /// Window length for `LastConfirmed`.
    pub last_ok_grace_days: i64,
}

/// Decide whether `now` falls inside the grace window.
pub fn evaluate(inputs: GraceInputs<'_>, now: DateTime<Utc>) -> GraceDecision {
    match inputs.strategy {
        GraceAnchor::LastConfirmed => {
            let Some(anchor) = inputs.settings.last_ok_on else {
                return GraceDecision::no_anchor();
            };
            let Some(until) = add_days(anchor, inputs.last_ok_grace_days.max(0)) else {
                return GraceDecision::out_of_range(anchor);
            };
            GraceDecision {
                in_grace: now <= until,
                anchor: Some(anchor),
                until: Some(until),
                new_lock: None,
            }
        }
        GraceAnchor::Expiry => {
            if let Some(lock) = inputs.settings.grace_lock {
                return GraceDecision {
                    in_grace: now <= lock.until,
                    anchor: inputs.settings.expires_at,
                    until: Some(lock.until),
                    new_lock: None,
                };
            }

            let Some(anchor) = inputs.reply_expiry.or(inputs.settings.expires_at) else {
                return GraceDecision::no_anchor();
            };
            let locked_days = inputs.settings.billing_grace_days();
            let Some(until) = add_days(anchor, locked_days) else {
                return GraceDecision::out_of_range(anchor);
            };
            let in_grace = now <= until;
            GraceDecision {
                in_grace,
                anchor: Some(anchor),
                until: Some(until),
                new_lock: in_grace.then_some(GraceLock {
                    locked_days,
                    started_on: now,
                    until,
                }),
            }
        }
    }
}
