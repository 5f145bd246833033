//! # OAuth Bearer Filter
//!
//! [`OAuthFilter`] authenticates requests carrying `Authorization: Bearer
//! <jwt>` and authorizes them against the caller's API products.
//!
//! ## Pipeline
//!
//! ```text
//! ExtractHeader -> Decode -> CacheLookup -> VerifySignature -> CacheStore -> Authorize
//! ```
//!
//! Every stage either moves to the next one or ends the request:
//!
//! | Stage | Failure | Escape hatch |
//! |---|---|---|
//! | ExtractHeader | header absent: `missing_authorization` | `allowNoAuthorization` |
//! | ExtractHeader | not `Bearer <token>`: `invalid_request` | none |
//! | Decode | `invalid_token` | `allowInvalidAuthorization` |
//! | VerifySignature | `invalid_token` | `allowInvalidAuthorization` |
//! | Authorize | `access_denied` | none |
//!
//! A cache hit skips verification. A hit whose `exp + gracePeriod` has
//! passed is removed from the cache but still honoured for this request.
//!
//! The header is stripped from the forwarded request whenever it was
//! present, unless `keep-authorization-header` is set. With `BRRTGATE_LOCAL=1`
//! the whole pipeline is skipped.

mod builder;

pub use builder::OAuthFilterBuilder;

use super::error::{AuthErrorKind, ErrorResponder};
use super::Middleware;
use crate::authorization::AuthorizationGate;
use crate::cache::{CacheStats, Sweeper, TokenCache};
use crate::clock::Clock;
use crate::config::{FilterConfig, FilterSettings};
use crate::request::{AttachedClaims, GatewayRequest, GatewayResponse};
use crate::runtime_config::RuntimeConfig;
use crate::security::SignatureVerifier;
use crate::token::{self, DecodedToken};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

static BEARER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Bearer (.+)$").expect("bearer regex should be valid"));

/// Token from a `Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    BEARER_REGEX
        .captures(header_value.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
}

/// How a request got through the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Local mode; nothing was checked
    Bypassed,
    /// No header, allowed by `allowNoAuthorization`
    Anonymous,
    /// Bad token, allowed by `allowInvalidAuthorization`
    Unverified,
    /// Token verified (or cached) and authorized
    Authorized,
}

impl Admission {
    pub fn is_authenticated(self) -> bool {
        self == Admission::Authorized
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Bypassed => "bypassed",
            Admission::Anonymous => "anonymous",
            Admission::Unverified => "unverified",
            Admission::Authorized => "authorized",
        }
    }
}

/// Terminal state of the pipeline.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// Continue to the upstream target
    Admit(Admission),
    /// Short-circuit with this response
    Reject(GatewayResponse),
}

impl FilterOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, FilterOutcome::Admit(_))
    }

    pub fn admission(&self) -> Option<Admission> {
        match self {
            FilterOutcome::Admit(a) => Some(*a),
            FilterOutcome::Reject(_) => None,
        }
    }

    pub fn response(&self) -> Option<&GatewayResponse> {
        match self {
            FilterOutcome::Admit(_) => None,
            FilterOutcome::Reject(res) => Some(res),
        }
    }

    /// `error` code of a rejection
    pub fn error_code(&self) -> Option<&str> {
        self.response()
            .and_then(|r| r.body.get("error"))
            .and_then(|v| v.as_str())
    }
}

pub(crate) struct CacheSlot {
    pub(crate) cache: Arc<dyn TokenCache>,
    pub(crate) capacity: usize,
}

/// Bearer-token authentication and product authorization filter.
///
/// Owns its validation cache and sweeper; two filters never share cached
/// validations unless a cache is injected into both.
pub struct OAuthFilter {
    settings: FilterSettings,
    runtime: RuntimeConfig,
    cache: Option<CacheSlot>,
    sweeper: Mutex<Option<Sweeper>>,
    verifier: SignatureVerifier,
    gate: AuthorizationGate,
    responder: ErrorResponder,
    clock: Arc<dyn Clock>,
}

impl OAuthFilter {
    pub fn builder(settings: FilterSettings) -> OAuthFilterBuilder {
        OAuthFilterBuilder::new(settings)
    }

    /// Validate `config`, read the environment toggles, and build a filter
    /// with the system clock and the default product authorizer.
    pub fn from_config(config: &FilterConfig) -> anyhow::Result<Self> {
        let settings = FilterSettings::from_config(config)?;
        OAuthFilterBuilder::new(settings)
            .runtime(RuntimeConfig::from_env())
            .build()
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn runtime(&self) -> RuntimeConfig {
        self.runtime
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Statistics of the validation cache, when caching is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|slot| slot.cache.stats())
    }

    /// Stop the background sweeper. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut guard = match self.sweeper.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut sweeper) = guard.take() {
            sweeper.shutdown();
        }
    }

    /// Run the pipeline for one request.
    ///
    /// On admission `req` is ready to forward: the authorization header is
    /// stripped (unless kept) and, when authorized, carries the sanitised
    /// claims header.
    pub fn on_request(&self, req: &mut GatewayRequest) -> FilterOutcome {
        if self.runtime.local {
            debug!(request_id = %req.request_id, "local mode, skipping oauth");
            return FilterOutcome::Admit(Admission::Bypassed);
        }

        let header = match req.get_header(&self.settings.header_name) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                if self.settings.allow_no_authorization {
                    debug!(request_id = %req.request_id, "no authorization header, allowed");
                    return self.admit(Admission::Anonymous);
                }
                return self.reject(AuthErrorKind::MissingAuthorization, req);
            }
        };
        if !self.settings.keep_header {
            req.remove_header(&self.settings.header_name);
        }

        let token = match bearer_token(&header) {
            Some(t) => t,
            None => return self.reject(AuthErrorKind::InvalidRequest, req),
        };

        let decoded = match token::decode(token) {
            Ok(d) => d,
            Err(e) => {
                if self.settings.allow_invalid_authorization {
                    warn!(request_id = %req.request_id, error = %e, "ignoring undecodable token");
                    return self.admit(Admission::Unverified);
                }
                debug!(request_id = %req.request_id, error = %e, "invalid token");
                return self.reject(AuthErrorKind::InvalidToken, req);
            }
        };

        if !self.validate(token, &decoded) {
            if self.settings.allow_invalid_authorization {
                warn!(request_id = %req.request_id, "ignoring failed token verification");
                req.token = Some(AttachedClaims {
                    claims: decoded.claims.to_value(),
                    verified: false,
                });
                return self.admit(Admission::Unverified);
            }
            return self.reject(AuthErrorKind::InvalidToken, req);
        }

        if self.gate.authorize(&decoded.claims, req) {
            self.admit(Admission::Authorized)
        } else {
            self.reject(AuthErrorKind::AccessDenied, req)
        }
    }

    /// Cache lookup, then verification and store on a miss
    fn validate(&self, token: &str, decoded: &DecodedToken) -> bool {
        let slot = match &self.cache {
            Some(slot) => slot,
            None => return self.verifier.verify(token, decoded).is_valid(),
        };

        if let Some(value) = slot.cache.lookup(token) {
            if &*value == token {
                debug!("found token in cache");
                if let Some(exp) = decoded.claims.expires_at() {
                    if self.settings.grace.is_expired(exp, self.clock.now_secs()) {
                        debug!(exp, "ejecting token from cache");
                        slot.cache.remove(token);
                    }
                }
                return true;
            }
        }

        debug!("token not found in cache");
        if !self.verifier.verify(token, decoded).is_valid() {
            return false;
        }
        let evict_after = decoded
            .claims
            .expires_at()
            .map(|exp| self.settings.grace.deadline(exp));
        if !slot
            .cache
            .try_store(token, Arc::from(token), evict_after, slot.capacity)
        {
            debug!(capacity = slot.capacity, "too many tokens in cache; not storing token");
        }
        true
    }

    fn admit(&self, admission: Admission) -> FilterOutcome {
        self.responder
            .stats()
            .record_admission(admission.is_authenticated());
        FilterOutcome::Admit(admission)
    }

    fn reject(&self, kind: AuthErrorKind, req: &GatewayRequest) -> FilterOutcome {
        FilterOutcome::Reject(self.responder.respond(kind, req))
    }
}

impl Middleware for OAuthFilter {
    fn before(&self, req: &mut GatewayRequest) -> Option<GatewayResponse> {
        match self.on_request(req) {
            FilterOutcome::Admit(_) => None,
            FilterOutcome::Reject(res) => Some(res),
        }
    }
}

impl Drop for OAuthFilter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FilterConfig;
    use http::Method;

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("  Bearer abc "), Some("abc"));
        assert_eq!(bearer_token("Token abc"), None);
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    fn filter(config: FilterConfig, runtime: RuntimeConfig) -> OAuthFilter {
        let settings = FilterSettings::from_config(&config).unwrap();
        OAuthFilter::builder(settings)
            .runtime(runtime)
            .clock(Arc::new(ManualClock::new(1_700_000_000)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_local_mode_bypasses_everything() {
        let f = filter(
            FilterConfig::default(),
            RuntimeConfig {
                local: true,
                ..RuntimeConfig::default()
            },
        );
        let mut req = GatewayRequest::new(Method::GET, "/").with_header("authorization", "junk");
        assert_eq!(f.on_request(&mut req).admission(), Some(Admission::Bypassed));
        assert_eq!(req.get_header("authorization"), Some("junk"));
    }

    #[test]
    fn test_header_stripped_even_when_rejected() {
        let f = filter(FilterConfig::default(), RuntimeConfig::default());
        let mut req = GatewayRequest::new(Method::GET, "/").with_header("Authorization", "Token abc");
        let outcome = f.on_request(&mut req);
        assert_eq!(outcome.error_code(), Some("invalid_request"));
        assert!(req.get_header("authorization").is_none());
    }

    #[test]
    fn test_empty_header_counts_as_missing() {
        let f = filter(FilterConfig::default(), RuntimeConfig::default());
        let mut req = GatewayRequest::new(Method::GET, "/").with_header("authorization", "");
        assert_eq!(
            f.on_request(&mut req).error_code(),
            Some("missing_authorization")
        );
    }

    #[test]
    fn test_middleware_before_maps_outcome() {
        let f = filter(FilterConfig::default(), RuntimeConfig::default());
        let mut req = GatewayRequest::new(Method::GET, "/");
        let res = f.before(&mut req).unwrap();
        assert_eq!(res.status, 401);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let config = FilterConfig {
            token_cache: true,
            ..FilterConfig::default()
        };
        let f = filter(config, RuntimeConfig::default());
        assert!(f.cache_stats().is_some());
        f.shutdown();
        f.shutdown();
    }
}
