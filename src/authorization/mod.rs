//! # Authorization Gate
//!
//! Decides whether verified claims entitle the caller to the requested
//! resource, and prepares what is forwarded upstream when they do.
//!
//! The allow/deny decision itself belongs to a [`ResourceAuthorizer`]. The
//! gate resolves the [`ResourceCheckMode`], attaches the verified claims to
//! the request, and on success sets the `x-authorization-claims` header:
//! base64 of the JSON claims with the private fields removed.

mod products;

pub use products::{ProductCatalog, ResourcePattern};

use crate::request::{AttachedClaims, GatewayRequest, ProxyInfo};
use crate::token::{claim, Claims};
use base64::Engine as _;
use http::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Header carrying the sanitised claims to the upstream target
pub const AUTHORIZATION_CLAIMS_HEADER: &str = "x-authorization-claims";

/// Claims never forwarded upstream
pub const PRIVATE_CLAIMS: &[&str] = &[
    claim::APPLICATION_NAME,
    claim::CLIENT_ID,
    claim::API_PRODUCT_LIST,
    claim::ISSUED_AT,
    claim::EXPIRES_AT,
];

/// How much of the request the authorizer checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCheckMode {
    /// Only the caller's product list against the target proxy
    ProductOnly,
    /// Product list plus the product's resource path patterns
    ResourcePath,
}

impl ResourceCheckMode {
    /// `product_only` configuration, overridden to product-only by the
    /// local-proxy environment toggle
    pub fn resolve(product_only: bool, local_proxy: bool) -> Self {
        if product_only || local_proxy {
            ResourceCheckMode::ProductOnly
        } else {
            ResourceCheckMode::ResourcePath
        }
    }
}

/// What the caller is trying to reach.
#[derive(Debug, Clone, Copy)]
pub struct ResourceTarget<'a> {
    pub method: &'a Method,
    pub proxy: Option<&'a ProxyInfo>,
    pub path: &'a str,
}

impl<'a> ResourceTarget<'a> {
    pub fn from_request(req: &'a GatewayRequest) -> Self {
        Self {
            method: &req.method,
            proxy: req.proxy.as_ref(),
            path: &req.path,
        }
    }

    /// Request path relative to the proxy base path, without query string.
    ///
    /// Always starts with `/`.
    pub fn relative_path(&self) -> String {
        let path = self.path.split('?').next().unwrap_or("");
        let base = self
            .proxy
            .map(|p| p.base_path.trim_end_matches('/'))
            .unwrap_or("");
        let rest = match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }
}

/// Decides whether claims permit access to a target.
pub trait ResourceAuthorizer: Send + Sync {
    fn is_authorized(
        &self,
        claims: &Claims,
        target: &ResourceTarget<'_>,
        mode: ResourceCheckMode,
    ) -> bool;
}

/// Authorization stage of the filter.
#[derive(Clone)]
pub struct AuthorizationGate {
    authorizer: Arc<dyn ResourceAuthorizer>,
    mode: ResourceCheckMode,
}

impl AuthorizationGate {
    pub fn new(authorizer: Arc<dyn ResourceAuthorizer>, mode: ResourceCheckMode) -> Self {
        Self { authorizer, mode }
    }

    pub fn mode(&self) -> ResourceCheckMode {
        self.mode
    }

    /// Attach `claims` to `req` and check them against the target.
    ///
    /// On success the sanitised claims header is set and `true` returned.
    /// On denial the request is left without the claims header.
    pub fn authorize(&self, claims: &Claims, req: &mut GatewayRequest) -> bool {
        req.token = Some(AttachedClaims {
            claims: claims.to_value(),
            verified: true,
        });

        let allowed = {
            let target = ResourceTarget::from_request(req);
            self.authorizer.is_authorized(claims, &target, self.mode)
        };
        if !allowed {
            debug!(mode = ?self.mode, path = %req.path, "authorizer denied access");
            return false;
        }

        req.set_header(AUTHORIZATION_CLAIMS_HEADER, outbound_claims(claims));
        true
    }
}

/// Claims with [`PRIVATE_CLAIMS`] removed
pub fn sanitize_claims(claims: &Claims) -> Value {
    Value::Object(claims.without(PRIVATE_CLAIMS))
}

/// Transport encoding of the sanitised claims: base64 of the JSON text
pub fn outbound_claims(claims: &Claims) -> String {
    base64::engine::general_purpose::STANDARD.encode(sanitize_claims(claims).to_string())
}
