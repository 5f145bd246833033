//! Gateway request and response types the authentication filter operates on.
//!
//! The filter sits in front of the upstream target: it reads the inbound
//! authorization header, may strip it, may attach decoded claims, and on
//! admission adds the sanitised claims header that is forwarded upstream.
//! Rejections are expressed as a [`GatewayResponse`] that short-circuits
//! the pipeline.

use crate::ids::{RequestId, REQUEST_ID_HEADER};
use http::Method;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation.
/// Most requests have ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path.
///
/// Header names use `Arc<str>` because they are often repeated
/// (Authorization, Content-Type, ...) and cloning is an atomic increment.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// The API proxy a request was routed to.
///
/// Product authorization is expressed in terms of proxies, and resource
/// patterns are relative to the proxy's base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    /// Proxy name as it appears in the product-to-proxy mapping
    pub name: String,
    /// Base path the proxy is mounted under (e.g. `/v1/pets`)
    pub base_path: String,
}

impl ProxyInfo {
    pub fn new(name: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
        }
    }
}

/// Claims attached to a request by the filter.
///
/// `verified` is `false` when the claims were decoded but the signature was
/// never confirmed, which only happens when invalid authorization is allowed
/// through. Consumers must not treat unverified claims as trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedClaims {
    pub claims: Value,
    pub verified: bool,
}

/// Inbound request seen by the filter.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Request ID for log correlation
    pub request_id: RequestId,
    /// HTTP method
    pub method: Method,
    /// Full request path (including the proxy base path)
    pub path: String,
    /// Proxy this request was routed to, if known
    pub proxy: Option<ProxyInfo>,
    /// Request headers (stack-allocated for ≤16 headers)
    pub headers: HeaderVec,
    /// Decoded token claims, populated by the filter
    pub token: Option<AttachedClaims>,
}

impl GatewayRequest {
    /// Create a request with no headers and no proxy information
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            proxy: None,
            headers: HeaderVec::new(),
            token: None,
        }
    }

    /// Builder-style proxy assignment
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyInfo) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Builder-style header assignment
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    ///
    /// A valid ULID in `x-request-id` becomes the request's id so log events
    /// correlate with the caller's.
    pub fn set_header(&mut self, name: &str, value: String) {
        if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            if let Ok(id) = value.parse::<RequestId>() {
                self.request_id = id;
            }
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Remove every header with the given name, returning whether any was present
    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.len() != before
    }

    /// Claims attached by the filter, if any
    #[must_use]
    pub fn claims(&self) -> Option<&Value> {
        self.token.as_ref().map(|t| &t.claims)
    }
}

/// Response produced when the filter rejects a request.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// Response body as JSON
    pub body: Value,
}

impl GatewayResponse {
    /// Create a JSON response with a `content-type` header
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
