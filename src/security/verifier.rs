use super::{KeyError, KeySource};
use crate::clock::{Clock, GraceWindow};
use crate::token::DecodedToken;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Signature algorithms accepted for bearer tokens
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Result of verifying one token.
///
/// Structural and cryptographic failures are distinguished here for logs and
/// tests; the filter collapses all of them into `invalid_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Signature, algorithm and time claims all check out
    Valid,
    /// Token could not be parsed for verification
    Malformed { error: String },
    /// No usable key for the token
    KeyUnavailable(KeyError),
    /// Header names an algorithm outside the allow-list
    DisallowedAlgorithm { alg: String },
    /// Signature does not match the key
    BadSignature,
    /// `now > exp + grace`
    Expired { exp: i64, now: i64 },
    /// `now < nbf - grace`
    NotYetValid { nbf: i64, now: i64 },
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid)
    }

    /// True for failures of the token's shape or key lookup rather than of
    /// the cryptographic check itself
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VerifyOutcome::Malformed { .. } | VerifyOutcome::KeyUnavailable(_)
        )
    }
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyOutcome::Valid => write!(f, "valid"),
            VerifyOutcome::Malformed { error } => write!(f, "malformed token: {}", error),
            VerifyOutcome::KeyUnavailable(e) => write!(f, "key unavailable: {}", e),
            VerifyOutcome::DisallowedAlgorithm { alg } => {
                write!(f, "algorithm '{}' not accepted", alg)
            }
            VerifyOutcome::BadSignature => write!(f, "invalid signature"),
            VerifyOutcome::Expired { exp, now } => {
                write!(f, "token expired (exp: {}, now: {})", exp, now)
            }
            VerifyOutcome::NotYetValid { nbf, now } => {
                write!(f, "token not yet valid (nbf: {}, now: {})", nbf, now)
            }
        }
    }
}

/// Verifies bearer token signatures and time claims.
///
/// The grace window and clock are shared with the validation cache so both
/// reach the same verdict on expiry for the same clock reading.
pub struct SignatureVerifier {
    keys: KeySource,
    window: GraceWindow,
    clock: Arc<dyn Clock>,
    validation: Validation,
    verifications: AtomicU64,
}

impl SignatureVerifier {
    pub fn new(keys: KeySource, window: GraceWindow, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        // Time claims are enforced below against the shared clock and window.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            keys,
            window,
            clock,
            validation,
            verifications: AtomicU64::new(0),
        }
    }

    pub fn key_source(&self) -> &KeySource {
        &self.keys
    }

    pub fn window(&self) -> GraceWindow {
        self.window
    }

    /// Number of verifications attempted so far
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    /// Verify `token`, whose unverified decoding is `decoded`.
    ///
    /// Never panics or errors: every failure becomes a [`VerifyOutcome`]
    /// variant and is logged with a single warning.
    pub fn verify(&self, token: &str, decoded: &DecodedToken) -> VerifyOutcome {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let outcome = self.verify_inner(token, decoded);
        if outcome.is_valid() {
            debug!(key_source = self.keys.describe(), "jwt verified");
        } else {
            warn!(
                reason = %outcome,
                structural = outcome.is_structural(),
                "error verifying jwt"
            );
        }
        outcome
    }

    fn verify_inner(&self, token: &str, decoded: &DecodedToken) -> VerifyOutcome {
        if !ACCEPTED_ALGORITHMS.contains(&decoded.header.alg) {
            return VerifyOutcome::DisallowedAlgorithm {
                alg: format!("{:?}", decoded.header.alg),
            };
        }

        let key = match self.keys.key_for(decoded) {
            Ok(k) => k,
            Err(e) => return VerifyOutcome::KeyUnavailable(e),
        };

        if let Err(e) = jsonwebtoken::decode::<Value>(token, &key, &self.validation) {
            return match e.kind() {
                ErrorKind::InvalidSignature => VerifyOutcome::BadSignature,
                ErrorKind::InvalidAlgorithm => VerifyOutcome::DisallowedAlgorithm {
                    alg: format!("{:?}", decoded.header.alg),
                },
                ErrorKind::InvalidRsaKey(msg) => {
                    VerifyOutcome::KeyUnavailable(KeyError::InvalidKeyMaterial {
                        error: msg.clone(),
                    })
                }
                other => VerifyOutcome::Malformed {
                    error: format!("{:?}", other),
                },
            };
        }

        // The signature covers the payload `decoded.claims` was read from.
        let now = self.clock.now_secs();
        if let Some(exp) = decoded.claims.expires_at() {
            if self.window.is_expired(exp, now) {
                return VerifyOutcome::Expired { exp, now };
            }
        }
        if let Some(nbf) = decoded.claims.not_before() {
            if self.window.is_premature(nbf, now) {
                return VerifyOutcome::NotYetValid { nbf, now };
            }
        }
        VerifyOutcome::Valid
    }
}
