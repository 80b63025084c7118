//! # Tollgate
//!
//! **License enforcement with a bounded grace window and a process-wide egress guard.**
//!
//! Tollgate periodically proves entitlement to a remote licensing authority
//! (License Manager for WooCommerce REST API), tolerates that authority being
//! unreachable for a bounded grace window, caches the resulting trust verdict
//! for fast per-request checks, and wraps the process's outbound HTTP path so
//! that no integration can send anything while the license is not in good
//! standing.
//!
//! ## Features
//!
//! - **Activation protocol**: activate, reactivate, deactivate and validate
//! - **Grace window**: anchored on the last confirmed check or on the expiry,
//!   with a grace lock that freezes the deadline on first entry
//! - **Domain pinning**: request target and post-redirect host must be the
//!   pinned authority, or the call fails closed
//! - **Egress guard**: every outbound call goes through the license policy
//! - **Audit trail**: one masked, size-bounded record per operation
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate::{EgressGuard, LicenseClient, TollgateConfig};
//!
//! fn main() -> Result<(), tollgate::TollgateError> {
//!     let mut config = TollgateConfig::new("helpdesk", "helpdesk-ai", "brvsoftware.com");
//!     config.app_version = "1.4.0";
//!
//!     let client = Arc::new(LicenseClient::new(config)?);
//!     let outcome = client.activate(Some("LICENSE-KEY-HERE"))?;
//!     println!("activate: ok={} status={}", outcome.ok, outcome.status);
//!
//!     // From here on every call through the global dispatcher is policed.
//!     EgressGuard::global(&client).install();
//!
//!     let gate = client.gatekeeper()?;
//!     println!("gate: ok={} status={}", gate.ok, gate.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Tollgate protects against:
//! - **Redirect substitution**: a forged "success" served from another host is rejected
//! - **Silent deadline sliding**: the grace deadline is locked once grace begins
//! - **Policy escape**: integrations that send through the dispatcher cannot bypass the guard
//!
//! Tollgate does **not** prevent binary patching, or code that opens its own
//! sockets instead of using the dispatcher.
//!
//! ## Configuration
//!
//! - `authority_host`: Pinned licensing host (bare host, no scheme)
//! - `grace_anchor`: `LastConfirmed` (default) or `Expiry`
//! - `recheck_after` / `grace_recheck_after`: Cached verdict lifetimes
//! - Consumer credentials: `LMFWC_CONSUMER_KEY` / `LMFWC_CONSUMER_SECRET`,
//!   then config, then the settings document
//!
//! See [`TollgateConfig`] for full documentation.

#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/tollgate/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod device;
pub mod errors;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Storage layer
pub mod store;

// Policy layer
pub mod policy;

// Egress guard
pub mod guard;

// Manager (main public API)
pub mod manager;

// Optional integrations
pub mod integrations;

// Re-exports for public API
pub use client::transport::{HttpDispatcher, OutboundRequest, Transport, TransportResponse};
pub use clock::{Clock, SystemClock};
pub use config::{ConsumerCredentials, GraceAnchor, TollgateConfig};
pub use errors::TollgateError;
pub use guard::{EgressGuard, EgressPolicy, Revalidate};
pub use integrations::scheduler::{spawn_hourly, PeriodicCheck, ScheduleHandle};
pub use manager::{GateVerdict, LicenseClient, LicenseOutcome, LicenseStores, OutcomeStatus};
pub use protocol::models::{CheckStatus, TrustStatus};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
