//! # Runtime Configuration Module
//!
//! Environment toggles that change how the filter behaves on a given
//! gateway host, independent of the plugin configuration.
//!
//! ## Environment Variables
//!
//! ### `BRRTGATE_LOCAL`
//!
//! `1` bypasses the filter entirely: every request is admitted untouched,
//! before the authorization header is even looked at. For running the
//! gateway offline against local targets.
//!
//! ### `BRRTGATE_LOCAL_PROXY`
//!
//! `1` forces product-only authorization regardless of `productOnly`.
//! Local proxies are not registered in any product's resource list.
//!
//! ### `BRRTGATE_OPENTRACE`
//!
//! Any non-empty value records rejections inside an `oauthv2` error span.
//!
//! The variables are read once when a filter is built; changing them
//! afterwards has no effect on that filter.
//!
//! ```rust
//! use brrtgate::runtime_config::RuntimeConfig;
//!
//! let runtime = RuntimeConfig::from_env();
//! if runtime.local {
//!     println!("filter bypassed");
//! }
//! ```

use std::env;

pub const ENV_LOCAL: &str = "BRRTGATE_LOCAL";
pub const ENV_LOCAL_PROXY: &str = "BRRTGATE_LOCAL_PROXY";
pub const ENV_OPENTRACE: &str = "BRRTGATE_OPENTRACE";

/// Environment toggles, captured once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Skip the filter for every request
    pub local: bool,
    /// Force product-only authorization
    pub local_proxy: bool,
    /// Wrap rejection events in an error span
    pub opentrace: bool,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).map(|v| v.trim() == "1").unwrap_or(false);
        RuntimeConfig {
            local: flag(ENV_LOCAL),
            local_proxy: flag(ENV_LOCAL_PROXY),
            opentrace: lookup(ENV_OPENTRACE)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
        }
    }
}
