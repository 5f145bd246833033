use super::{ResourceAuthorizer, ResourceCheckMode, ResourceTarget};
use crate::token::Claims;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A product resource path pattern.
///
/// - `/` and `/**` match every path
/// - a trailing `/**` matches the prefix and anything below it
/// - `*` matches within a single path segment
/// - anything else is an exact match (a trailing `/` is ignored)
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    source: String,
    regex: Regex,
}

impl ResourcePattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns the regex error if the generated expression is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&Self::to_regex(pattern))?,
        })
    }

    fn to_regex(pattern: &str) -> String {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed == "/" || trimmed == "/**" {
            return "^.*$".to_string();
        }
        let normalized = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        let normalized = normalized.trim_end_matches('/');
        let (body, recursive) = match normalized.strip_suffix("/**") {
            Some(body) => (body, true),
            None => (normalized, false),
        };

        let mut re = String::from("^");
        for (i, segment) in body.split('/').enumerate() {
            if i > 0 {
                re.push('/');
            }
            if segment == "**" {
                re.push_str(".*");
                continue;
            }
            let pieces: Vec<String> = segment.split('*').map(regex::escape).collect();
            re.push_str(&pieces.join("[^/]*"));
        }
        if recursive {
            re.push_str("(/.*)?");
        }
        re.push_str("/?$");
        re
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.regex.is_match(relative_path)
    }
}

/// Default [`ResourceAuthorizer`]: products map to proxies and resource paths.
///
/// A caller is allowed when some product in its `api_product_list` is bound
/// to the target proxy. In [`ResourceCheckMode::ResourcePath`] the product's
/// resource patterns must also match the path relative to the proxy base
/// path; a product with no patterns allows every path.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    product_to_proxy: HashMap<String, Vec<String>>,
    product_to_resources: HashMap<String, Vec<ResourcePattern>>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `product_to_proxy` / `product_to_api_resource` mappings.
    ///
    /// Patterns that fail to compile are skipped with a warning.
    pub fn from_mappings(
        product_to_proxy: &HashMap<String, Vec<String>>,
        product_to_api_resource: &HashMap<String, Vec<String>>,
    ) -> Self {
        let mut catalog = Self {
            product_to_proxy: product_to_proxy.clone(),
            product_to_resources: HashMap::new(),
        };
        for (product, patterns) in product_to_api_resource {
            catalog.add_resources(product, patterns);
        }
        catalog
    }

    /// Builder-style registration of one product
    #[must_use]
    pub fn with_product(mut self, product: &str, proxies: &[&str], resources: &[&str]) -> Self {
        self.product_to_proxy
            .entry(product.to_string())
            .or_default()
            .extend(proxies.iter().map(|p| p.to_string()));
        let resources: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
        self.add_resources(product, &resources);
        self
    }

    fn add_resources(&mut self, product: &str, patterns: &[String]) {
        let compiled = self
            .product_to_resources
            .entry(product.to_string())
            .or_default();
        for pattern in patterns {
            match ResourcePattern::new(pattern) {
                Ok(p) => compiled.push(p),
                Err(e) => warn!(product, pattern = %pattern, error = %e, "skipping invalid resource pattern"),
            }
        }
    }

    pub fn product_count(&self) -> usize {
        self.product_to_proxy.len()
    }
}

impl ResourceAuthorizer for ProductCatalog {
    fn is_authorized(
        &self,
        claims: &Claims,
        target: &ResourceTarget<'_>,
        mode: ResourceCheckMode,
    ) -> bool {
        let products = claims.api_product_list();
        if products.is_empty() {
            debug!("token carries no api_product_list");
            return false;
        }
        let proxy = match target.proxy {
            Some(p) => p,
            None => {
                debug!("request has no proxy; cannot match products");
                return false;
            }
        };
        let relative = target.relative_path();

        for product in products {
            let bound = self
                .product_to_proxy
                .get(product)
                .map(|proxies| proxies.iter().any(|p| p == &proxy.name))
                .unwrap_or(false);
            if !bound {
                continue;
            }
            if mode == ResourceCheckMode::ProductOnly {
                debug!(product, proxy = %proxy.name, "product grants proxy");
                return true;
            }
            match self.product_to_resources.get(product) {
                Some(patterns) if !patterns.is_empty() => {
                    if let Some(p) = patterns.iter().find(|p| p.matches(&relative)) {
                        debug!(product, pattern = p.as_str(), path = %relative, "resource path allowed");
                        return true;
                    }
                }
                _ => {
                    debug!(product, proxy = %proxy.name, "product has no resource restrictions");
                    return true;
                }
            }
        }
        debug!(proxy = %proxy.name, path = %relative, "no product grants access");
        false
    }
}
