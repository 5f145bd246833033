#![allow(dead_code)]

pub mod fixtures {
    pub const SIGNING_KEY: &str = include_str!("../fixtures/signing_private.pem");
    pub const PUBLIC_KEY: &str = include_str!("../fixtures/signing_public.pem");
    pub const OTHER_SIGNING_KEY: &str = include_str!("../fixtures/other_private.pem");
    pub const OTHER_PUBLIC_KEY: &str = include_str!("../fixtures/other_public.pem");
    /// `key-1` is the signing key, `key-2` the other key
    pub const JWKS: &str = include_str!("../fixtures/jwks.json");

    /// Fixed "now" for every test clock
    pub const NOW: i64 = 1_700_000_000;
}

pub mod tokens {
    use super::fixtures::{NOW, SIGNING_KEY};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};

    /// Sign `claims` with an RS256 PEM private key
    pub fn mint_with(pem: &str, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    pub fn mint(claims: &Value) -> String {
        mint_with(SIGNING_KEY, None, claims)
    }

    /// Typical gateway access token for product `p1`, valid for an hour
    pub fn product_claims(products: &[&str]) -> Value {
        json!({
            "application_name": "pet-app",
            "client_id": "client-123",
            "api_product_list": products,
            "iat": NOW,
            "exp": NOW + 3600,
            "scope": "read",
            "sub": "user-42"
        })
    }

    pub fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }
}

pub mod filters {
    use super::fixtures::{NOW, PUBLIC_KEY};
    use brrtgate::clock::ManualClock;
    use brrtgate::config::{FilterConfig, FilterSettings};
    use brrtgate::middleware::{AuthMetrics, OAuthFilter, StatsSink};
    use brrtgate::request::{GatewayRequest, ProxyInfo};
    use brrtgate::runtime_config::RuntimeConfig;
    use http::Method;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Static public key, product `p1` bound to proxy `pets`
    pub fn base_config() -> FilterConfig {
        let mut product_to_proxy = HashMap::new();
        product_to_proxy.insert("p1".to_string(), vec!["pets".to_string()]);
        FilterConfig {
            public_key: Some(PUBLIC_KEY.to_string()),
            product_to_proxy,
            ..FilterConfig::default()
        }
    }

    pub struct Harness {
        pub filter: OAuthFilter,
        pub clock: Arc<ManualClock>,
        pub metrics: Arc<AuthMetrics>,
    }

    pub fn harness(config: FilterConfig) -> Harness {
        harness_with_runtime(config, RuntimeConfig::default())
    }

    pub fn harness_with_runtime(config: FilterConfig, runtime: RuntimeConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(NOW));
        let metrics = Arc::new(AuthMetrics::new());
        let settings = FilterSettings::from_config(&config).unwrap();
        let filter = OAuthFilter::builder(settings)
            .runtime(runtime)
            .clock(Arc::clone(&clock) as Arc<dyn brrtgate::clock::Clock>)
            .stats(Arc::clone(&metrics) as Arc<dyn StatsSink>)
            .sweep(false)
            .build()
            .unwrap();
        Harness {
            filter,
            clock,
            metrics,
        }
    }

    /// GET on the `pets` proxy mounted at `/v1/pets`
    pub fn pets_request(path: &str) -> GatewayRequest {
        GatewayRequest::new(Method::GET, path).with_proxy(ProxyInfo::new("pets", "/v1/pets"))
    }
}

pub mod temp_files {
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Temporary file with the given extension, deleted on drop
    pub fn with_extension(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("brrtgate_test_")
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }
}
