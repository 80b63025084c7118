//! End-to-end: license verdicts from a stub authority drive the egress guard.

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tollgate::{
    EgressGuard, HttpDispatcher, LicenseClient, LicenseStores, OutboundRequest, TollgateConfig,
    TollgateError, Transport, TransportResponse, TrustStatus,
};

const AUTHORITY: &str = "brvsoftware.com";

/// Answers the authority from a script and counts everything else.
struct Network {
    replies: Mutex<VecDeque<Value>>,
    authority_calls: AtomicUsize,
    other_calls: AtomicUsize,
}

impl Network {
    fn new(replies: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            authority_calls: AtomicUsize::new(0),
            other_calls: AtomicUsize::new(0),
        })
    }

    fn other_calls(&self) -> usize {
        self.other_calls.load(Ordering::SeqCst)
    }
}

impl Transport for Network {
    fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError> {
        if request.host() == AUTHORITY {
            self.authority_calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TollgateError::Transport("authority offline".to_string()))?;
            return Ok(TransportResponse {
                status: 200,
                final_url: request.url,
                body: body.to_string().into_bytes(),
            });
        }
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransportResponse {
            status: 204,
            final_url: request.url,
            body: Vec::new(),
        })
    }
}

fn setup(replies: Vec<Value>) -> (Arc<LicenseClient>, Arc<HttpDispatcher>, Arc<Network>) {
    let network = Network::new(replies);
    let dispatcher = Arc::new(HttpDispatcher::new(network.clone()));
    let mut config = TollgateConfig::new("helpdesk", "helpdesk-ai", AUTHORITY);
    config.app_version = "1.4.0";
    let client =
        LicenseClient::with_parts(config, LicenseStores::in_memory(), dispatcher.clone()).unwrap();
    client.set_license_key("ABCD-EFGH-IJKL-1234").unwrap();
    (Arc::new(client), dispatcher, network)
}

#[test]
fn test_webhook_blocked_after_rejection() {
    let (client, dispatcher, network) =
        setup(vec![json!({"success": false, "message": "License key not found"})]);
    let guard = EgressGuard::for_client(&client);
    assert!(guard.install());

    // Unknown verdict: the guard asks the authority first.
    let result = dispatcher.post("https://hooks.example.com/ticket", b"{}".to_vec());
    match result {
        Err(TollgateError::EgressBlocked { method, url }) => {
            assert_eq!(method, "POST");
            assert_eq!(url, "https://hooks.example.com/ticket");
        }
        other => panic!("expected EgressBlocked, got {:?}", other.map(|r| r.status)),
    }
    assert_eq!(network.other_calls(), 0);
    assert_eq!(network.authority_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.trust_cache().status(), TrustStatus::Invalid);

    // Fresh invalid verdict blocks without asking again.
    assert!(dispatcher.get("https://hooks.example.com/status").is_err());
    assert_eq!(network.authority_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_webhook_allowed_after_success() {
    let (client, dispatcher, network) = setup(vec![json!({
        "success": true,
        "data": {"activationData": {"token": "act-1"}, "validFor": 365}
    })]);
    let outcome = client.activate(None).unwrap();
    assert!(outcome.ok);

    let guard = EgressGuard::for_client(&client);
    guard.install();

    let response = dispatcher
        .post("https://hooks.example.com/ticket", b"{}".to_vec())
        .unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(network.other_calls(), 1);
}

#[test]
fn test_authority_reachable_while_invalid() {
    let (client, dispatcher, network) = setup(vec![
        json!({"success": false}),
        json!({"success": true, "data": {"activationData": {"token": "act-2"}}}),
    ]);
    let guard = EgressGuard::for_client(&client);
    guard.install();

    let first = client.validate(None, true).unwrap();
    assert!(!first.ok);
    assert!(dispatcher.get("https://hooks.example.com/a").is_err());

    // Recovery goes through the guarded dispatcher too.
    let recovered = client.activate(None).unwrap();
    assert!(recovered.ok);
    assert!(dispatcher.get("https://hooks.example.com/a").is_ok());
    assert_eq!(network.other_calls(), 1);
}

#[test]
fn test_uninstall_restores_unpoliced_transport() {
    let (client, dispatcher, network) = setup(vec![json!({"success": false})]);
    client.validate(None, true).unwrap();

    let guard = EgressGuard::for_client(&client);
    assert!(guard.install());
    assert!(!guard.install());
    assert!(dispatcher.get("https://hooks.example.com/a").is_err());

    assert!(guard.uninstall());
    assert!(!guard.is_installed());
    assert!(dispatcher.get("https://hooks.example.com/a").is_ok());
    assert_eq!(network.other_calls(), 1);
}
