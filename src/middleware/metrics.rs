use super::error::AuthErrorKind;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives the filter's counters.
///
/// `increment_status_count` is called exactly once per rejection with the
/// mapped status. The other hooks default to no-ops.
pub trait StatsSink: Send + Sync {
    fn increment_status_count(&self, status: u16);

    fn record_rejection(&self, _kind: AuthErrorKind) {}

    /// A request passed the filter; `authenticated` is false for fail-open admissions
    fn record_admission(&self, _authenticated: bool) {}
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn increment_status_count(&self, _status: u16) {}
}

/// Lock-free authentication counters with Prometheus text output.
///
/// All counters use `Ordering::Relaxed`; values are eventually consistent.
#[derive(Debug, Default)]
pub struct AuthMetrics {
    status_counts: DashMap<u16, AtomicU64>,
    rejections: [AtomicU64; 4],
    admitted: AtomicU64,
    admitted_unauthenticated: AtomicU64,
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_count(&self, status: u16) -> u64 {
        self.status_counts
            .get(&status)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn rejections(&self, kind: AuthErrorKind) -> u64 {
        self.rejections[kind.index()].load(Ordering::Relaxed)
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Admissions with verified (or cached) credentials
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Admissions through `allowNoAuthorization` / `allowInvalidAuthorization`
    pub fn admitted_unauthenticated(&self) -> u64 {
        self.admitted_unauthenticated.load(Ordering::Relaxed)
    }

    /// Render all counters in Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP brrtgate_auth_admitted_total Requests admitted by the filter\n");
        out.push_str("# TYPE brrtgate_auth_admitted_total counter\n");
        out.push_str(&format!(
            "brrtgate_auth_admitted_total{{authenticated=\"true\"}} {}\n",
            self.admitted()
        ));
        out.push_str(&format!(
            "brrtgate_auth_admitted_total{{authenticated=\"false\"}} {}\n",
            self.admitted_unauthenticated()
        ));

        out.push_str("# HELP brrtgate_auth_rejections_total Requests rejected by error code\n");
        out.push_str("# TYPE brrtgate_auth_rejections_total counter\n");
        for kind in AuthErrorKind::ALL {
            out.push_str(&format!(
                "brrtgate_auth_rejections_total{{error=\"{}\"}} {}\n",
                kind.code(),
                self.rejections(kind)
            ));
        }

        out.push_str("# HELP brrtgate_auth_responses_total Rejection responses by status\n");
        out.push_str("# TYPE brrtgate_auth_responses_total counter\n");
        let mut statuses: Vec<(u16, u64)> = self
            .status_counts
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .collect();
        statuses.sort_unstable();
        for (status, count) in statuses {
            out.push_str(&format!(
                "brrtgate_auth_responses_total{{status=\"{}\"}} {}\n",
                status, count
            ));
        }
        out
    }
}

impl StatsSink for AuthMetrics {
    fn increment_status_count(&self, status: u16) {
        if let Some(c) = self.status_counts.get(&status) {
            c.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.status_counts
            .entry(status)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejection(&self, kind: AuthErrorKind) {
        self.rejections[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn record_admission(&self, authenticated: bool) {
        if authenticated {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.admitted_unauthenticated.fetch_add(1, Ordering::Relaxed);
        }
    }
}
