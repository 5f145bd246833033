//! Time source and grace-period arithmetic.
//!
//! The validation cache and the signature verifier both decide whether a
//! token is past its expiry. They must agree for any given clock reading,
//! so both go through [`GraceWindow`] and both read time from the same
//! [`Clock`] owned by the filter.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Manually driven clock for tests and tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Grace period applied beyond a token's `exp` (and before its `nbf`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraceWindow {
    grace_secs: u64,
}

impl GraceWindow {
    pub fn new(grace_secs: u64) -> Self {
        Self { grace_secs }
    }

    pub fn grace_secs(&self) -> u64 {
        self.grace_secs
    }

    /// The last second at which a token expiring at `exp` is still accepted.
    pub fn deadline(&self, exp: i64) -> i64 {
        exp.saturating_add(self.grace_secs.min(i64::MAX as u64) as i64)
    }

    /// `now > exp + grace`
    pub fn is_expired(&self, exp: i64, now: i64) -> bool {
        now > self.deadline(exp)
    }

    /// `now < nbf - grace`
    pub fn is_premature(&self, nbf: i64, now: i64) -> bool {
        now < nbf.saturating_sub(self.grace_secs.min(i64::MAX as u64) as i64)
    }
}
