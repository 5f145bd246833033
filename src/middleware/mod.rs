mod core;
mod error;
mod metrics;
mod oauth;

pub use core::{run_before, Middleware};
pub use error::{AuthErrorKind, DefaultStatusMapper, ErrorResponder, StatusMapper};
pub use metrics::{AuthMetrics, NoopStats, StatsSink};
pub use oauth::{bearer_token, Admission, FilterOutcome, OAuthFilter, OAuthFilterBuilder};
