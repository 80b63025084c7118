//! The process-wide outbound HTTP send path.
//!
//! Every outbound call in the process goes through one [`HttpDispatcher`]
//! (normally [`HttpDispatcher::global`]). The dispatcher delegates to a
//! swappable [`Transport`]; the egress guard wraps that transport, so the
//! policy applies to all callers without per-call-site wrapping.

use crate::TollgateError;
use once_cell::sync::{Lazy, OnceCell};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Default timeout for calls that do not set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Per-request timeout, overriding the transport default.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// Request with no headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Parse `url` and build a request.
    pub fn parse(method: Method, url: &str) -> Result<Self, TollgateError> {
        let url = Url::parse(url)
            .map_err(|e| TollgateError::ProtocolError(format!("Invalid URL {}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, TollgateError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| TollgateError::ProtocolError(format!("Invalid header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set the body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lowercased destination host, empty if the URL has none.
    pub fn host(&self) -> String {
        host_of(&self.url)
    }
}

/// Response captured from the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// URL after following redirects.
    pub final_url: Url,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Lowercased host of a URL.
pub fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// The lowest-level send operation.
pub trait Transport: Send + Sync {
    /// Perform the request. Timeouts and connection failures are `Transport` errors.
    fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError>;
}

/// Blocking reqwest transport; the client is built on first use.
pub struct ReqwestTransport {
    client: OnceCell<Client>,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Transport with the given default timeout.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            default_timeout,
        }
    }

    fn client(&self) -> Result<&Client, TollgateError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.default_timeout)
                .build()
                .map_err(|e| TollgateError::Transport(format!("Failed to create client: {}", e)))
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError> {
        let mut builder = self
            .client()?
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .map_err(|e| TollgateError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response
            .bytes()
            .map_err(|e| TollgateError::Transport(format!("Failed to read body: {}", e)))?
            .to_vec();

        Ok(TransportResponse {
            status,
            final_url,
            body,
        })
    }
}

static GLOBAL_DISPATCHER: Lazy<Arc<HttpDispatcher>> =
    Lazy::new(|| Arc::new(HttpDispatcher::new(Arc::new(ReqwestTransport::default()))));

/// Single dispatch point for outbound HTTP.
///
/// At most one interceptor is installed at a time; the transport it wrapped
/// is kept here so any handle can restore it.
pub struct HttpDispatcher {
    transport: RwLock<Arc<dyn Transport>>,
    unwrapped: Mutex<Option<Arc<dyn Transport>>>,
}

impl HttpDispatcher {
    /// Dispatcher over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: RwLock::new(transport),
            unwrapped: Mutex::new(None),
        }
    }

    /// The process-wide dispatcher, backed by [`ReqwestTransport`].
    pub fn global() -> Arc<HttpDispatcher> {
        GLOBAL_DISPATCHER.clone()
    }

    /// Send through whatever transport is currently installed.
    ///
    /// The lock is released before sending, so a transport may itself
    /// dispatch (the guard's lazy revalidation does).
    pub fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TollgateError> {
        let transport = self.current();
        transport.send(request)
    }

    /// GET convenience.
    pub fn get(&self, url: &str) -> Result<TransportResponse, TollgateError> {
        self.send(OutboundRequest::parse(Method::GET, url)?)
    }

    /// POST convenience.
    pub fn post(&self, url: &str, body: Vec<u8>) -> Result<TransportResponse, TollgateError> {
        self.send(OutboundRequest::parse(Method::POST, url)?.body(body))
    }

    /// Currently installed transport.
    pub fn current(&self) -> Arc<dyn Transport> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an interceptor is installed.
    pub fn is_intercepted(&self) -> bool {
        self.unwrapped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace the current transport with `wrap(current)`.
    ///
    /// Returns `false` without calling `wrap` if an interceptor is already
    /// installed, whoever installed it.
    pub(crate) fn intercept<F>(&self, wrap: F) -> bool
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport>,
    {
        let mut unwrapped = self.unwrapped.lock().unwrap_or_else(PoisonError::into_inner);
        if unwrapped.is_some() {
            return false;
        }
        let mut slot = self.transport.write().unwrap_or_else(PoisonError::into_inner);
        let current = slot.clone();
        *slot = wrap(current.clone());
        *unwrapped = Some(current);
        true
    }

    /// Restore the transport the interceptor wrapped. Returns `false` if none is installed.
    pub(crate) fn restore(&self) -> bool {
        let mut unwrapped = self.unwrapped.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(original) = unwrapped.take() else {
            return false;
        };
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = original;
        true
    }
}
