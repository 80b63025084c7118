//! HTTP client for the licensing authority.
//!
//! Requests go through the process [`HttpDispatcher`] so the egress guard
//! sees them (and always lets them through, since they target the pinned
//! host). Both the request target and the final post-redirect host are
//! checked against the pinned authority host.

use crate::client::transport::{host_of, HttpDispatcher, OutboundRequest};
use crate::config::{ConsumerCredentials, TollgateConfig};
use crate::protocol::models::AuthorityReply;
use crate::protocol::shapes::{normalize, parse_body};
use crate::TollgateError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, Url};
use std::sync::Arc;
use std::time::Duration;

/// Operations exposed by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityAction {
    /// Bind this device to the license.
    Activate,
    /// Re-enable an existing activation by token.
    Reactivate,
    /// Release one activation (token) or all of them.
    Deactivate,
    /// Check the license.
    Validate,
}

impl AuthorityAction {
    /// Path segment for this action.
    pub fn path_segment(&self) -> &'static str {
        match self {
            AuthorityAction::Activate => "activate",
            AuthorityAction::Reactivate => "reactivate",
            AuthorityAction::Deactivate => "deactivate",
            AuthorityAction::Validate => "validate",
        }
    }
}

/// Fail closed unless `url` targets `expected`.
pub fn assert_expected_domain(url: &Url, expected: &str) -> Result<(), TollgateError> {
    let found = host_of(url);
    if found != expected.to_ascii_lowercase() {
        return Err(TollgateError::DomainViolation {
            expected: expected.to_string(),
            found,
        });
    }
    Ok(())
}

/// `Authorization` header value for HTTP Basic.
pub fn basic_auth_header(credentials: &ConsumerCredentials) -> String {
    let pair = format!("{}:{}", credentials.key, credentials.secret);
    format!("Basic {}", STANDARD.encode(pair))
}

/// Licensing authority client.
pub struct AuthorityClient {
    dispatcher: Arc<HttpDispatcher>,
    pinned_host: String,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl AuthorityClient {
    /// Create a client from config, sending through `dispatcher`.
    pub fn new(config: &TollgateConfig, dispatcher: Arc<HttpDispatcher>) -> Result<Self, TollgateError> {
        config.validate()?;
        Ok(Self {
            dispatcher,
            pinned_host: config.authority_host.to_ascii_lowercase(),
            base_url: format!("https://{}{}", config.authority_host, config.api_base_path),
            user_agent: build_user_agent(config),
            timeout: config.request_timeout,
        })
    }

    /// Create a client whose requests target a different base URL (for testing).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Pinned authority host.
    pub fn host(&self) -> &str {
        &self.pinned_host
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the request URL for an action.
    pub fn build_url(
        &self,
        action: AuthorityAction,
        license_key: &str,
        params: &[(&str, String)],
    ) -> Result<Url, TollgateError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TollgateError::ConfigError(format!("Invalid authority URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TollgateError::ConfigError("Authority URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(action.path_segment())
            .push(license_key);
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Call the authority and normalize its reply.
    ///
    /// # Errors
    /// - `DomainViolation` if the request target or final response host is not pinned.
    ///   The request target is checked before anything is sent.
    /// - `Transport` on timeout, connection failure or an unreadable body.
    pub fn call(
        &self,
        action: AuthorityAction,
        license_key: &str,
        params: &[(&str, String)],
        credentials: Option<&ConsumerCredentials>,
    ) -> Result<AuthorityReply, TollgateError> {
        let url = self.build_url(action, license_key, params)?;
        assert_expected_domain(&url, &self.pinned_host)?;

        let mut request = OutboundRequest::new(Method::GET, url)
            .header(USER_AGENT, &self.user_agent)?
            .header(ACCEPT, "application/json")?
            .timeout(self.timeout);
        if let Some(credentials) = credentials {
            request = request.header(AUTHORIZATION, &basic_auth_header(credentials))?;
        }

        tracing::debug!(action = action.path_segment(), host = %self.pinned_host, "calling license authority");
        let response = self.dispatcher.send(request)?;

        assert_expected_domain(&response.final_url, &self.pinned_host)?;

        Ok(normalize(response.status, parse_body(&response.body)))
    }
}

/// Build a User-Agent string from config.
///
/// Format: `<product>/tollgate-<version> <app>`
/// Example: `helpdesk-ai/tollgate-0.1.0 helpdesk`
pub fn build_user_agent(config: &TollgateConfig) -> String {
    let product = &config.user_agent_product;
    let app = &config.app_name;

    let tg_version = env!("CARGO_PKG_VERSION");

    format!("{}/tollgate-{} {}", product, tg_version, app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{Transport, TransportResponse};
    use crate::protocol::models::Verdict;
    use std::sync::Mutex;

    /// Records the last request and answers with a fixed final URL.
    struct Recorder {
        final_url: Option<&'static str>,
        body: &'static str,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl Recorder {
        fn new(final_url: Option<&'static str>, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                final_url,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Recorder {
        fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError> {
            let final_url = match self.final_url {
                Some(url) => Url::parse(url).unwrap(),
                None => request.url.clone(),
            };
            self.seen.lock().unwrap().push(request);
            Ok(TransportResponse {
                status: 200,
                final_url,
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    fn test_config() -> TollgateConfig {
        let mut config = TollgateConfig::new("helpdesk", "helpdesk-ai", "brvsoftware.com");
        config.user_agent_product = "helpdesk-ai";
        config
    }

    fn client_over(transport: Arc<Recorder>) -> AuthorityClient {
        AuthorityClient::new(&test_config(), Arc::new(HttpDispatcher::new(transport))).unwrap()
    }

    #[test]
    fn test_build_user_agent() {
        let config = test_config();
        let ua = build_user_agent(&config);
        let tg_version = env!("CARGO_PKG_VERSION");

        assert_eq!(ua, format!("helpdesk-ai/tollgate-{} helpdesk", tg_version));
    }

    #[test]
    fn test_build_url_with_params() {
        let client = client_over(Recorder::new(None, "{}"));
        let url = client
            .build_url(
                AuthorityAction::Reactivate,
                "ABCD-1234",
                &[("token", "tok 1".to_string())],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://brvsoftware.com/wp-json/lmfwc/v2/licenses/reactivate/ABCD-1234?token=tok+1"
        );
    }

    #[test]
    fn test_build_url_escapes_key() {
        let client = client_over(Recorder::new(None, "{}"));
        let url = client
            .build_url(AuthorityAction::Validate, "a/b?c", &[])
            .unwrap();
        assert_eq!(url.host_str(), Some("brvsoftware.com"));
        assert!(url.path().ends_with("/validate/a%2Fb%3Fc"));
        assert!(url.query().is_none());
    }

    #[test]
    fn test_basic_auth_header() {
        let creds = ConsumerCredentials::new("ck", "cs").unwrap();
        assert_eq!(basic_auth_header(&creds), "Basic Y2s6Y3M=");
    }

    #[test]
    fn test_call_sends_headers_and_normalizes() {
        let recorder = Recorder::new(None, r#"{"success": true, "data": {"activationData": {"token": "t1"}}}"#);
        let client = client_over(recorder.clone());
        let creds = ConsumerCredentials::new("ck", "cs").unwrap();

        let reply = client
            .call(AuthorityAction::Activate, "KEY", &[], Some(&creds))
            .unwrap();
        assert_eq!(reply.verdict, Verdict::Success);
        assert_eq!(reply.token.as_deref(), Some("t1"));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].headers[AUTHORIZATION], "Basic Y2s6Y3M=");
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_call_without_credentials_sends_no_auth() {
        let recorder = Recorder::new(None, "{}");
        let client = client_over(recorder.clone());
        client.call(AuthorityAction::Validate, "KEY", &[], None).unwrap();
        assert!(!recorder.seen.lock().unwrap()[0].headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_redirect_off_pinned_host_fails_closed() {
        let recorder = Recorder::new(Some("https://evil.example.com/ok"), r#"{"success": true}"#);
        let client = client_over(recorder);
        let result = client.call(AuthorityAction::Validate, "KEY", &[], None);
        match result {
            Err(TollgateError::DomainViolation { expected, found }) => {
                assert_eq!(expected, "brvsoftware.com");
                assert_eq!(found, "evil.example.com");
            }
            other => panic!("expected DomainViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_target_rejected_before_sending() {
        let recorder = Recorder::new(None, r#"{"success": true}"#);
        let client = client_over(recorder.clone()).with_base_url("https://evil.example.com/api");
        let result = client.call(AuthorityAction::Activate, "KEY", &[], None);
        assert!(matches!(result, Err(TollgateError::DomainViolation { .. })));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pinned_host_is_case_insensitive() {
        let url = Url::parse("https://BRVSOFTWARE.com/x").unwrap();
        assert!(assert_expected_domain(&url, "brvsoftware.com").is_ok());
    }
}
