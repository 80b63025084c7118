//! Activate a license, then police all outbound HTTP with the egress guard.
//!
//! # Running
//!
//! ```bash
//! export LICENSE_KEY="your-license-key"
//! export LMFWC_CONSUMER_KEY="ck_..."
//! export LMFWC_CONSUMER_SECRET="cs_..."
//! cargo run --example activate_and_guard
//! ```
//!
//! # Note
//!
//! The authority host is a compile-time constant. Reading it from the
//! environment would let anyone point the client at a server that always
//! says "success".

use std::sync::Arc;
use tollgate::{EgressGuard, HttpDispatcher, LicenseClient, TollgateConfig, TollgateError};

const AUTHORITY_HOST: &str = "brvsoftware.com";

fn main() {
    let license_key = match std::env::var("LICENSE_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Set LICENSE_KEY environment variable");
            std::process::exit(2);
        }
    };

    let mut config = TollgateConfig::new("helpdesk", "helpdesk-ai", AUTHORITY_HOST);
    config.app_version = env!("CARGO_PKG_VERSION");

    let client = match LicenseClient::new(config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match client.activate(Some(&license_key)) {
        Ok(outcome) => {
            println!("activate: ok={} status={}", outcome.ok, outcome.status);
            if let Some(message) = outcome.message {
                println!("  message: {}", message);
            }
        }
        Err(TollgateError::DomainViolation { expected, found }) => {
            eprintln!("SECURITY: authority answered from {} (expected {})", found, expected);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Activation error: {}", e);
            std::process::exit(1);
        }
    }

    // Every call through the global dispatcher is checked from here on.
    EgressGuard::global(&client).install();

    match HttpDispatcher::global().get("https://httpbin.org/get") {
        Ok(response) => println!("outbound call allowed: HTTP {}", response.status),
        Err(TollgateError::EgressBlocked { method, url }) => {
            println!("outbound call blocked: {} {}", method, url);
        }
        Err(e) => println!("outbound call failed: {}", e),
    }

    // Periodic scheduling would normally take over here; one manual pass shows the shape.
    let outcome = client.validate_and_update();
    println!("validate: ok={} status={}", outcome.ok, outcome.status);
}
