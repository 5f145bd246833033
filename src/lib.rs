//! # brrtgate
//!
//! **brrtgate** is an OAuth 2.0 bearer-token filter for API gateways. It
//! authenticates requests carrying `Authorization: Bearer <jwt>`, checks the
//! caller's API products against the requested proxy and resource, and
//! forwards the caller's claims upstream in an `x-authorization-claims`
//! header.
//!
//! ## Architecture
//!
//! - **[`token`]** - Compact JWS decoding (no verification) and typed claims
//! - **[`cache`]** - Validation cache with lazy eviction and a background sweeper
//! - **[`security`]** - Key resolution and RS256 signature verification
//! - **[`authorization`]** - Product/resource authorization and claim sanitisation
//! - **[`middleware`]** - The [`OAuthFilter`] pipeline, error responses and metrics
//! - **[`config`]** - Plugin configuration (YAML/JSON) and validated settings
//! - **[`runtime_config`]** - `BRRTGATE_*` environment toggles
//! - **[`clock`]** - Time source and the grace window shared by cache and verifier
//! - **[`logging`]** - tracing-subscriber setup
//! - **[`cli`]** - The `brrtgate` binary's commands
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Gateway
//!     participant Filter as OAuthFilter
//!     participant Cache as TokenCache
//!     participant Verifier as SignatureVerifier
//!     participant Gate as AuthorizationGate
//!     participant Upstream
//!
//!     Gateway->>Filter: on_request(req)
//!     alt BRRTGATE_LOCAL=1
//!         Filter-->>Gateway: Admit (bypassed)
//!     end
//!     Filter->>Filter: Extract "Bearer <token>"<br/>strip header unless kept
//!     alt header missing / malformed
//!         Filter-->>Gateway: 401 missing_authorization<br/>400 invalid_request
//!     end
//!     Filter->>Filter: decode token
//!     alt tokenCache enabled
//!         Filter->>Cache: lookup(token)
//!         alt hit
//!             Filter->>Cache: remove(token) if now > exp + grace
//!         else miss
//!             Filter->>Verifier: verify(token)
//!             Filter->>Cache: try_store(token, exp + grace)
//!         end
//!     else
//!         Filter->>Verifier: verify(token)
//!     end
//!     alt invalid
//!         Filter-->>Gateway: 401 invalid_token
//!     end
//!     Filter->>Gate: authorize(claims, req)
//!     alt denied
//!         Filter-->>Gateway: 403 access_denied
//!     end
//!     Gate->>Gate: set x-authorization-claims
//!     Filter-->>Gateway: Admit
//!     Gateway->>Upstream: forwarded request
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brrtgate::config::FilterConfig;
//! use brrtgate::middleware::{FilterOutcome, OAuthFilter};
//! use brrtgate::request::{GatewayRequest, ProxyInfo};
//!
//! let filter = OAuthFilter::from_config(&FilterConfig::from_path("oauth.yaml")?)?;
//!
//! let mut req = GatewayRequest::new(http::Method::GET, "/v1/pets/7")
//!     .with_proxy(ProxyInfo::new("pets", "/v1/pets"))
//!     .with_header("authorization", format!("Bearer {}", token));
//!
//! match filter.on_request(&mut req) {
//!     FilterOutcome::Admit(_) => forward(req),
//!     FilterOutcome::Reject(res) => respond(res),
//! }
//! ```
//!
//! ## Concurrency
//!
//! A filter is `Send + Sync` and handles requests concurrently without
//! per-request locking. The validation cache is the only shared mutable
//! state; it is owned by the filter instance (no global singleton) and is
//! swept on its own thread.

pub mod authorization;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod request;
pub mod runtime_config;
pub mod security;
pub mod token;

pub use config::{FilterConfig, FilterSettings};
pub use middleware::{FilterOutcome, Middleware, OAuthFilter};
pub use request::{GatewayRequest, GatewayResponse, ProxyInfo};
