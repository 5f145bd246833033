//! # Filter Configuration
//!
//! [`FilterConfig`] mirrors the gateway's plugin configuration block and
//! keeps its option names (`authorization-header`, `gracePeriod`,
//! `tokenCacheSize`, ...). It deserialises from YAML or JSON.
//!
//! [`FilterSettings`] is the validated, immutable form the filter captures
//! at construction. Nothing is re-read from configuration per request.
//!
//! ## Example
//!
//! ```yaml
//! authorization-header: authorization
//! keep-authorization-header: false
//! gracePeriod: 5
//! productOnly: true
//! tokenCache: true
//! tokenCacheSize: 500
//! allowNoAuthorization: false
//! allowInvalidAuthorization: false
//! public_key: |
//!   -----BEGIN PUBLIC KEY-----
//!   ...
//!   -----END PUBLIC KEY-----
//! product_to_proxy:
//!   gold: [pets]
//! product_to_api_resource:
//!   gold: ["/owners/**"]
//! ```

use crate::cache::DEFAULT_PURGE_INTERVAL_MS;
use crate::clock::GraceWindow;
use crate::security::{JwkKeySet, KeySource};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default header carrying the bearer token
pub const DEFAULT_AUTHORIZATION_HEADER: &str = "authorization";

/// Default maximum number of cached validations
pub const DEFAULT_TOKEN_CACHE_SIZE: usize = 100;

/// `jwk_keys` as it appears in configuration: either the serialised key set
/// or the key set document inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JwkKeysOption {
    Serialized(String),
    Inline(Value),
}

/// Raw plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    #[serde(rename = "authorization-header")]
    pub authorization_header: String,
    #[serde(rename = "keep-authorization-header")]
    pub keep_authorization_header: bool,
    /// Seconds of tolerance applied to `exp` (and `nbf`)
    #[serde(rename = "gracePeriod")]
    pub grace_period: u64,
    #[serde(rename = "productOnly")]
    pub product_only: bool,
    #[serde(rename = "tokenCache")]
    pub token_cache: bool,
    #[serde(rename = "tokenCacheSize")]
    pub token_cache_size: usize,
    /// Background sweep interval in milliseconds
    #[serde(rename = "tokenCachePurgeInterval")]
    pub token_cache_purge_interval: u64,
    #[serde(rename = "allowNoAuthorization")]
    pub allow_no_authorization: bool,
    #[serde(rename = "allowInvalidAuthorization")]
    pub allow_invalid_authorization: bool,
    pub public_key: Option<String>,
    pub jwk_keys: Option<JwkKeysOption>,
    pub product_to_proxy: HashMap<String, Vec<String>>,
    pub product_to_api_resource: HashMap<String, Vec<String>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            authorization_header: DEFAULT_AUTHORIZATION_HEADER.to_string(),
            keep_authorization_header: false,
            grace_period: 0,
            product_only: false,
            token_cache: false,
            token_cache_size: DEFAULT_TOKEN_CACHE_SIZE,
            token_cache_purge_interval: DEFAULT_PURGE_INTERVAL_MS,
            allow_no_authorization: false,
            allow_invalid_authorization: false,
            public_key: None,
            jwk_keys: None,
            product_to_proxy: HashMap::new(),
            product_to_api_resource: HashMap::new(),
        }
    }
}

impl FilterConfig {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("failed to parse filter configuration as YAML")
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).context("failed to parse filter configuration as JSON")
    }

    /// Load from a file; `.yaml`/`.yml` are parsed as YAML, anything else as JSON
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read filter configuration {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        parsed.with_context(|| format!("invalid filter configuration in {}", path.display()))
    }
}

/// Validation cache settings; present only when `tokenCache` is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub purge_interval: Duration,
}

/// Validated configuration captured by a filter instance.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Lower-cased header name
    pub header_name: String,
    pub keep_header: bool,
    pub grace: GraceWindow,
    pub product_only: bool,
    pub cache: Option<CacheSettings>,
    pub allow_no_authorization: bool,
    pub allow_invalid_authorization: bool,
    pub key_source: KeySource,
    pub product_to_proxy: HashMap<String, Vec<String>>,
    pub product_to_api_resource: HashMap<String, Vec<String>>,
}

impl FilterSettings {
    /// Validate a raw configuration.
    ///
    /// A `public_key` that is not valid PEM is accepted here and logged;
    /// every token is then rejected as `invalid_token`. A malformed
    /// `jwk_keys` set is a configuration error.
    pub fn from_config(config: &FilterConfig) -> anyhow::Result<Self> {
        let header_name = config.authorization_header.trim().to_ascii_lowercase();
        if header_name.is_empty() {
            bail!("authorization-header must not be empty");
        }
        if config.token_cache_size == 0 {
            bail!("tokenCacheSize must be greater than zero");
        }

        let cache = if config.token_cache {
            if config.token_cache_purge_interval == 0 {
                bail!("tokenCachePurgeInterval must be greater than zero");
            }
            Some(CacheSettings {
                capacity: config.token_cache_size,
                purge_interval: Duration::from_millis(config.token_cache_purge_interval),
            })
        } else {
            None
        };

        let key_source = match (&config.jwk_keys, &config.public_key) {
            (Some(jwk), _) => {
                let set = match jwk {
                    JwkKeysOption::Serialized(text) => JwkKeySet::from_json(text),
                    JwkKeysOption::Inline(doc) => JwkKeySet::from_value(doc),
                }
                .context("invalid jwk_keys")?;
                if set.is_empty() {
                    warn!("jwk_keys contains no usable RS256 keys; all tokens will be rejected");
                }
                KeySource::keyed(Arc::new(set))
            }
            (None, Some(pem)) => KeySource::from_pem(pem),
            (None, None) => {
                warn!("neither public_key nor jwk_keys configured; all tokens will be rejected");
                KeySource::Unconfigured
            }
        };

        Ok(Self {
            header_name,
            keep_header: config.keep_authorization_header,
            grace: GraceWindow::new(config.grace_period),
            product_only: config.product_only,
            cache,
            allow_no_authorization: config.allow_no_authorization,
            allow_invalid_authorization: config.allow_invalid_authorization,
            key_source,
            product_to_proxy: config.product_to_proxy.clone(),
            product_to_api_resource: config.product_to_api_resource.clone(),
        })
    }
}

impl TryFrom<&FilterConfig> for FilterSettings {
    type Error = anyhow::Error;

    fn try_from(config: &FilterConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}
