use super::{CacheSlot, OAuthFilter};
use crate::authorization::{AuthorizationGate, ProductCatalog, ResourceAuthorizer, ResourceCheckMode};
use crate::cache::{MemoryTokenCache, Sweeper, TokenCache};
use crate::clock::{Clock, SystemClock};
use crate::config::FilterSettings;
use crate::middleware::error::{DefaultStatusMapper, ErrorResponder, StatusMapper};
use crate::middleware::metrics::{NoopStats, StatsSink};
use crate::runtime_config::RuntimeConfig;
use crate::security::SignatureVerifier;
use anyhow::Context;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Builder for [`OAuthFilter`]
///
/// Everything except the settings has a default:
/// - runtime toggles all off (use [`RuntimeConfig::from_env`] in production)
/// - [`SystemClock`]
/// - [`ProductCatalog`] built from the settings' product mappings
/// - [`MemoryTokenCache`] sized from `tokenCacheSize`, swept in the background
/// - [`DefaultStatusMapper`] and no stats sink
///
/// ```rust,ignore
/// use brrtgate::config::{FilterConfig, FilterSettings};
/// use brrtgate::middleware::{AuthMetrics, OAuthFilter};
/// use std::sync::Arc;
///
/// let settings = FilterSettings::from_config(&FilterConfig::from_path("oauth.yaml")?)?;
/// let metrics = Arc::new(AuthMetrics::new());
/// let filter = OAuthFilter::builder(settings)
///     .runtime(brrtgate::runtime_config::RuntimeConfig::from_env())
///     .stats(Arc::clone(&metrics) as _)
///     .build()?;
/// ```
pub struct OAuthFilterBuilder {
    settings: FilterSettings,
    runtime: RuntimeConfig,
    clock: Option<Arc<dyn Clock>>,
    authorizer: Option<Arc<dyn ResourceAuthorizer>>,
    cache: Option<Arc<dyn TokenCache>>,
    status_mapper: Option<Arc<dyn StatusMapper>>,
    stats: Option<Arc<dyn StatsSink>>,
    sweep: bool,
}

impl OAuthFilterBuilder {
    pub fn new(settings: FilterSettings) -> Self {
        Self {
            settings,
            runtime: RuntimeConfig::default(),
            clock: None,
            authorizer: None,
            cache: None,
            status_mapper: None,
            stats: None,
            sweep: true,
        }
    }

    #[must_use]
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Clock shared by the verifier, the cache eviction check and the sweeper
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn authorizer(mut self, authorizer: Arc<dyn ResourceAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Use this cache instead of a fresh [`MemoryTokenCache`].
    ///
    /// Ignored when `tokenCache` is off.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn status_mapper(mut self, mapper: Arc<dyn StatusMapper>) -> Self {
        self.status_mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Whether to run the background sweeper (default `true`)
    #[must_use]
    pub fn sweep(mut self, sweep: bool) -> Self {
        self.sweep = sweep;
        self
    }

    /// Assemble the filter
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper thread cannot be started.
    pub fn build(self) -> anyhow::Result<OAuthFilter> {
        let settings = self.settings;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mode = ResourceCheckMode::resolve(settings.product_only, self.runtime.local_proxy);
        let authorizer = self.authorizer.unwrap_or_else(|| {
            Arc::new(ProductCatalog::from_mappings(
                &settings.product_to_proxy,
                &settings.product_to_api_resource,
            ))
        });
        let gate = AuthorizationGate::new(authorizer, mode);

        let mut sweeper = None;
        let cache = match settings.cache {
            Some(cache_settings) => {
                let cache: Arc<dyn TokenCache> = self
                    .cache
                    .unwrap_or_else(|| Arc::new(MemoryTokenCache::new(cache_settings.capacity)));
                if self.sweep {
                    sweeper = Some(
                        Sweeper::spawn(
                            Arc::clone(&cache),
                            cache_settings.purge_interval,
                            Arc::clone(&clock),
                        )
                        .context("failed to start token cache sweeper")?,
                    );
                }
                Some(CacheSlot {
                    cache,
                    capacity: cache_settings.capacity,
                })
            }
            None => {
                if self.cache.is_some() {
                    debug!("tokenCache is off; ignoring injected cache");
                }
                None
            }
        };

        let verifier = SignatureVerifier::new(
            settings.key_source.clone(),
            settings.grace,
            Arc::clone(&clock),
        );
        let responder = ErrorResponder::new(
            self.status_mapper
                .unwrap_or_else(|| Arc::new(DefaultStatusMapper)),
            self.stats.unwrap_or_else(|| Arc::new(NoopStats)),
            self.runtime.opentrace,
        );

        info!(
            header = %settings.header_name,
            keys = settings.key_source.describe(),
            mode = ?mode,
            token_cache = cache.is_some(),
            grace_secs = settings.grace.grace_secs(),
            local = self.runtime.local,
            "oauth filter initialised"
        );

        Ok(OAuthFilter {
            settings,
            runtime: self.runtime,
            cache,
            sweeper: Mutex::new(sweeper),
            verifier,
            gate,
            responder,
            clock,
        })
    }
}
