mod common;

use base64::Engine as _;
use brrtgate::authorization::{
    ResourceAuthorizer, ResourceCheckMode, ResourceTarget, AUTHORIZATION_CLAIMS_HEADER,
};
use brrtgate::clock::{Clock, ManualClock};
use brrtgate::config::{FilterConfig, FilterSettings, JwkKeysOption};
use brrtgate::middleware::{
    Admission, AuthErrorKind, AuthMetrics, Middleware, OAuthFilter, StatsSink, StatusMapper,
};
use brrtgate::runtime_config::RuntimeConfig;
use brrtgate::token::Claims;
use http::Method;
use common::filters::{base_config, harness, harness_with_runtime, pets_request};
use common::fixtures::{JWKS, NOW, OTHER_SIGNING_KEY};
use common::tokens::{bearer, mint, mint_with, product_claims};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn forwarded_claims(req: &brrtgate::GatewayRequest) -> Value {
    let header = req.get_header(AUTHORIZATION_CLAIMS_HEADER).unwrap();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header)
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn product_only() -> FilterConfig {
    FilterConfig {
        product_only: true,
        ..base_config()
    }
}

#[test]
fn test_missing_header_is_rejected() {
    let h = harness(base_config());
    let mut req = pets_request("/v1/pets");
    let outcome = h.filter.on_request(&mut req);

    let res = outcome.response().unwrap();
    assert_eq!(res.status, 401);
    assert_eq!(
        res.body,
        json!({"error": "missing_authorization", "error_description": "Missing Authorization header"})
    );
    assert_eq!(res.get_header("content-type"), Some("application/json"));
    assert_eq!(h.metrics.status_count(401), 1);
    assert_eq!(h.metrics.rejections(AuthErrorKind::MissingAuthorization), 1);
}

#[test]
fn test_missing_header_allowed() {
    let h = harness(FilterConfig {
        allow_no_authorization: true,
        ..base_config()
    });
    let mut req = pets_request("/v1/pets");
    let outcome = h.filter.on_request(&mut req);
    assert_eq!(outcome.admission(), Some(Admission::Anonymous));
    assert!(req.get_header(AUTHORIZATION_CLAIMS_HEADER).is_none());
    assert!(req.token.is_none());
    assert_eq!(h.metrics.admitted_unauthenticated(), 1);
}

#[test]
fn test_wrong_scheme_is_invalid_request() {
    let h = harness(base_config());
    let mut req = pets_request("/v1/pets").with_header("authorization", "Token abc");
    let outcome = h.filter.on_request(&mut req);
    assert_eq!(outcome.error_code(), Some("invalid_request"));
    assert_eq!(outcome.response().unwrap().status, 400);
    assert_eq!(
        outcome.response().unwrap().body["error_description"],
        "Invalid Authorization header"
    );
}

#[test]
fn test_wrong_scheme_not_rescued_by_allow_flags() {
    let h = harness(FilterConfig {
        allow_no_authorization: true,
        allow_invalid_authorization: true,
        ..base_config()
    });
    let mut req = pets_request("/v1/pets").with_header("authorization", "Basic dXNlcjpwdw==");
    assert_eq!(
        h.filter.on_request(&mut req).error_code(),
        Some("invalid_request")
    );
}

#[test]
fn test_valid_token_admitted_with_sanitised_claims() {
    let h = harness(product_only());
    let token = mint(&product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets/7").with_header("Authorization", bearer(&token));

    let outcome = h.filter.on_request(&mut req);
    assert_eq!(outcome.admission(), Some(Admission::Authorized));

    let forwarded = forwarded_claims(&req);
    for private in ["api_product_list", "iat", "exp", "application_name", "client_id"] {
        assert!(forwarded.get(private).is_none(), "{} leaked", private);
    }
    assert_eq!(forwarded, json!({"scope": "read", "sub": "user-42"}));

    assert!(req.get_header("authorization").is_none());
    let attached = req.token.as_ref().unwrap();
    assert!(attached.verified);
    assert_eq!(attached.claims["client_id"], "client-123");
    assert_eq!(h.metrics.admitted(), 1);
}

#[test]
fn test_keep_authorization_header() {
    let h = harness(FilterConfig {
        keep_authorization_header: true,
        ..product_only()
    });
    let token = mint(&product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut req).is_admitted());
    assert_eq!(req.get_header("authorization"), Some(bearer(&token).as_str()));
}

#[test]
fn test_custom_header_name() {
    let h = harness(FilterConfig {
        authorization_header: "X-Api-Token".to_string(),
        ..product_only()
    });
    let token = mint(&product_claims(&["p1"]));

    let mut wrong = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert_eq!(
        h.filter.on_request(&mut wrong).error_code(),
        Some("missing_authorization")
    );

    let mut right = pets_request("/v1/pets").with_header("x-api-token", bearer(&token));
    assert!(h.filter.on_request(&mut right).is_admitted());
    assert!(right.get_header("x-api-token").is_none());
}

#[test]
fn test_denied_product_is_access_denied() {
    let h = harness(product_only());
    let token = mint(&product_claims(&["p2"]));
    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));

    let outcome = h.filter.on_request(&mut req);
    assert_eq!(outcome.error_code(), Some("access_denied"));
    assert_eq!(outcome.response().unwrap().status, 403);
    assert!(req.get_header(AUTHORIZATION_CLAIMS_HEADER).is_none());
    assert_eq!(h.metrics.status_count(403), 1);
}

#[test]
fn test_resource_path_mode() {
    let mut resources = HashMap::new();
    resources.insert("p1".to_string(), vec!["/owners/**".to_string()]);
    let h = harness(FilterConfig {
        product_to_api_resource: resources,
        ..base_config()
    });
    let token = mint(&product_claims(&["p1"]));

    let mut allowed = pets_request("/v1/pets/owners/3").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut allowed).is_admitted());

    let mut denied = pets_request("/v1/pets/stores").with_header("authorization", bearer(&token));
    assert_eq!(
        h.filter.on_request(&mut denied).error_code(),
        Some("access_denied")
    );
}

#[test]
fn test_local_proxy_forces_product_only() {
    let mut resources = HashMap::new();
    resources.insert("p1".to_string(), vec!["/owners".to_string()]);
    let config = FilterConfig {
        product_to_api_resource: resources,
        ..base_config()
    };
    let runtime = RuntimeConfig {
        local_proxy: true,
        ..RuntimeConfig::default()
    };
    let h = harness_with_runtime(config, runtime);
    let token = mint(&product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets/stores").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut req).is_admitted());
}

#[test]
fn test_local_mode_bypasses_filter() {
    let runtime = RuntimeConfig {
        local: true,
        ..RuntimeConfig::default()
    };
    let h = harness_with_runtime(base_config(), runtime);
    let mut req = pets_request("/v1/pets").with_header("authorization", "Token abc");
    assert_eq!(
        h.filter.on_request(&mut req).admission(),
        Some(Admission::Bypassed)
    );
    assert_eq!(req.get_header("authorization"), Some("Token abc"));
    assert_eq!(h.filter.verifier().verifications(), 0);
}

#[test]
fn test_undecodable_token() {
    let h = harness(base_config());
    let mut req = pets_request("/v1/pets").with_header("authorization", "Bearer not-a-jwt");
    assert_eq!(
        h.filter.on_request(&mut req).error_code(),
        Some("invalid_token")
    );
    assert_eq!(h.filter.verifier().verifications(), 0);
}

#[test]
fn test_undecodable_token_allowed() {
    let h = harness(FilterConfig {
        allow_invalid_authorization: true,
        ..base_config()
    });
    let mut req = pets_request("/v1/pets").with_header("authorization", "Bearer not-a-jwt");
    assert_eq!(
        h.filter.on_request(&mut req).admission(),
        Some(Admission::Unverified)
    );
    assert!(req.token.is_none());
    assert!(req.get_header("authorization").is_none());
}

#[test]
fn test_bad_signature_is_invalid_token() {
    let h = harness(product_only());
    let token = mint_with(OTHER_SIGNING_KEY, None, &product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    let outcome = h.filter.on_request(&mut req);
    assert_eq!(outcome.error_code(), Some("invalid_token"));
    assert_eq!(outcome.response().unwrap().status, 401);
    assert!(req.token.is_none());
}

#[test]
fn test_bad_signature_allowed_keeps_claims_marked_unverified() {
    let h = harness(FilterConfig {
        allow_invalid_authorization: true,
        ..product_only()
    });
    let token = mint_with(OTHER_SIGNING_KEY, None, &product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));

    assert_eq!(
        h.filter.on_request(&mut req).admission(),
        Some(Admission::Unverified)
    );
    let attached = req.token.as_ref().unwrap();
    assert!(!attached.verified);
    assert_eq!(attached.claims["sub"], "user-42");
    assert!(req.get_header(AUTHORIZATION_CLAIMS_HEADER).is_none());
}

#[test]
fn test_expiry_respects_grace_period() {
    let h = harness(FilterConfig {
        grace_period: 30,
        ..product_only()
    });
    let mut claims = product_claims(&["p1"]);
    claims["exp"] = json!(NOW - 10);
    let token = mint(&claims);

    let mut within = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut within).is_admitted());

    h.clock.advance(21);
    let mut beyond = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert_eq!(
        h.filter.on_request(&mut beyond).error_code(),
        Some("invalid_token")
    );
}

#[test]
fn test_cache_hit_skips_verifier() {
    let h = harness(FilterConfig {
        token_cache: true,
        ..product_only()
    });
    let token = mint(&product_claims(&["p1"]));

    for _ in 0..3 {
        let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));
        assert!(h.filter.on_request(&mut req).is_admitted());
        assert!(req.get_header(AUTHORIZATION_CLAIMS_HEADER).is_some());
    }
    assert_eq!(h.filter.verifier().verifications(), 1);

    let stats = h.filter.cache_stats().unwrap();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_cache_hit_within_grace_is_kept() {
    let h = harness(FilterConfig {
        token_cache: true,
        grace_period: 10,
        ..product_only()
    });
    let token = mint(&product_claims(&["p1"]));
    let mut first = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut first).is_admitted());

    h.clock.set(NOW + 3600 + 10);
    let mut second = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut second).is_admitted());
    assert_eq!(h.filter.cache_stats().unwrap().size, 1);
    assert_eq!(h.filter.verifier().verifications(), 1);
}

#[test]
fn test_cache_eviction_after_grace_forces_reverification() {
    let h = harness(FilterConfig {
        token_cache: true,
        grace_period: 10,
        ..product_only()
    });
    let token = mint(&product_claims(&["p1"]));
    let mut first = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut first).is_admitted());
    assert_eq!(h.filter.verifier().verifications(), 1);

    // Past exp + grace: the cached validation is honoured once, then dropped
    h.clock.set(NOW + 3600 + 11);
    let mut second = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(h.filter.on_request(&mut second).is_admitted());
    assert_eq!(h.filter.verifier().verifications(), 1);
    assert_eq!(h.filter.cache_stats().unwrap().size, 0);

    let mut third = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert_eq!(
        h.filter.on_request(&mut third).error_code(),
        Some("invalid_token")
    );
    assert_eq!(h.filter.verifier().verifications(), 2);
}

#[test]
fn test_cache_size_is_bounded() {
    let h = harness(FilterConfig {
        token_cache: true,
        token_cache_size: 2,
        ..product_only()
    });
    for i in 0..5 {
        let mut claims = product_claims(&["p1"]);
        claims["sub"] = json!(format!("user-{}", i));
        let token = mint(&claims);
        let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));
        assert!(h.filter.on_request(&mut req).is_admitted());
    }
    let stats = h.filter.cache_stats().unwrap();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.capacity, 2);
    assert_eq!(stats.rejected_stores, 3);
}

#[test]
fn test_concurrent_requests_respect_cache_bound() {
    let h = Arc::new(harness(FilterConfig {
        token_cache: true,
        token_cache_size: 4,
        ..product_only()
    }));
    let tokens: Vec<String> = (0..16)
        .map(|i| {
            let mut claims = product_claims(&["p1"]);
            claims["sub"] = json!(format!("user-{}", i));
            mint(&claims)
        })
        .collect();

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for _ in 0..4 {
                    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&token));
                    assert!(h.filter.on_request(&mut req).is_admitted());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(h.filter.cache_stats().unwrap().size <= 4);
    assert_eq!(h.metrics.admitted(), 64);
}

#[test]
fn test_filters_do_not_share_cache() {
    let config = FilterConfig {
        token_cache: true,
        ..product_only()
    };
    let a = harness(config.clone());
    let b = harness(config);
    let token = mint(&product_claims(&["p1"]));

    let mut req_a = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(a.filter.on_request(&mut req_a).is_admitted());
    let mut req_b = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    assert!(b.filter.on_request(&mut req_b).is_admitted());

    assert_eq!(a.filter.verifier().verifications(), 1);
    assert_eq!(b.filter.verifier().verifications(), 1);
}

#[test]
fn test_keyed_verification_by_kid() {
    let h = harness(FilterConfig {
        public_key: None,
        jwk_keys: Some(JwkKeysOption::Serialized(JWKS.to_string())),
        ..product_only()
    });
    let other = mint_with(OTHER_SIGNING_KEY, Some("key-2"), &product_claims(&["p1"]));
    let mut ok = pets_request("/v1/pets").with_header("authorization", bearer(&other));
    assert!(h.filter.on_request(&mut ok).is_admitted());

    let no_kid = mint(&product_claims(&["p1"]));
    let mut missing = pets_request("/v1/pets").with_header("authorization", bearer(&no_kid));
    assert_eq!(
        h.filter.on_request(&mut missing).error_code(),
        Some("invalid_token")
    );

    let unknown = mint_with(OTHER_SIGNING_KEY, Some("key-9"), &product_claims(&["p1"]));
    let mut req = pets_request("/v1/pets").with_header("authorization", bearer(&unknown));
    assert_eq!(
        h.filter.on_request(&mut req).error_code(),
        Some("invalid_token")
    );
}

#[test]
fn test_opentrace_does_not_change_response() {
    let runtime = RuntimeConfig {
        opentrace: true,
        ..RuntimeConfig::default()
    };
    let h = harness_with_runtime(base_config(), runtime);
    let mut req = pets_request("/v1/pets");
    let res = h.filter.before(&mut req).unwrap();
    assert_eq!(res.status, 401);
    assert_eq!(res.body["error"], "missing_authorization");
}

#[test]
fn test_every_rejection_counted_once() {
    let h = harness(product_only());
    let denied = mint(&product_claims(&["p9"]));
    let cases = [
        None,
        Some("Token x".to_string()),
        Some("Bearer x.y".to_string()),
        Some(bearer(&denied)),
    ];
    for header in cases {
        let mut req = pets_request("/v1/pets");
        if let Some(value) = header {
            req = req.with_header("authorization", value);
        }
        assert!(!h.filter.on_request(&mut req).is_admitted());
    }
    assert_eq!(h.metrics.total_rejections(), 4);
    assert_eq!(h.metrics.status_count(401), 2);
    assert_eq!(h.metrics.status_count(400), 1);
    assert_eq!(h.metrics.status_count(403), 1);
}

/// Allows only writes from the `ops` client
struct OpsWritesOnly;

impl ResourceAuthorizer for OpsWritesOnly {
    fn is_authorized(&self, claims: &Claims, target: &ResourceTarget<'_>, _: ResourceCheckMode) -> bool {
        *target.method != Method::GET
            && claims.get("client_id").and_then(|v| v.as_str()) == Some("ops")
    }
}

struct NotFoundOnDenial;

impl StatusMapper for NotFoundOnDenial {
    fn status_for(&self, kind: AuthErrorKind) -> u16 {
        match kind {
            AuthErrorKind::AccessDenied => 404,
            _ => 401,
        }
    }
}

#[test]
fn test_injected_authorizer_and_status_mapper() {
    let metrics = Arc::new(AuthMetrics::new());
    let settings = FilterSettings::from_config(&base_config()).unwrap();
    let filter = OAuthFilter::builder(settings)
        .clock(Arc::new(ManualClock::new(NOW)) as Arc<dyn Clock>)
        .authorizer(Arc::new(OpsWritesOnly))
        .status_mapper(Arc::new(NotFoundOnDenial))
        .stats(Arc::clone(&metrics) as Arc<dyn StatsSink>)
        .sweep(false)
        .build()
        .unwrap();

    let mut claims = product_claims(&[]);
    claims["client_id"] = json!("ops");
    let token = mint(&claims);

    let mut read = pets_request("/v1/pets").with_header("authorization", bearer(&token));
    let outcome = filter.on_request(&mut read);
    assert_eq!(outcome.error_code(), Some("access_denied"));
    assert_eq!(outcome.response().unwrap().status, 404);
    assert_eq!(metrics.status_count(404), 1);

    let mut write = brrtgate::GatewayRequest::new(Method::POST, "/anywhere")
        .with_header("authorization", bearer(&token));
    assert!(filter.on_request(&mut write).is_admitted());
    assert!(write.get_header(AUTHORIZATION_CLAIMS_HEADER).is_some());
}
