//! # Security Module
//!
//! Cryptographic verification of bearer tokens.
//!
//! ## Key resolution
//!
//! A filter is configured with exactly one [`KeySource`]:
//!
//! - **Static** - a single PEM public key (`public_key`). Every token is
//!   verified against it.
//! - **Keyed** - a set of public keys looked up by the `kid` in the token
//!   header through a [`KeyResolver`]. [`JwkKeySet`] is the resolver built
//!   from the `jwk_keys` configuration option; gateways with their own key
//!   store plug in a different implementation.
//!
//! ## Verification
//!
//! [`SignatureVerifier`] checks the signature against an allow-list of
//! algorithms (RS256 only) and then enforces `exp`/`nbf` with the same
//! [`crate::clock::GraceWindow`] the validation cache uses. The detailed
//! [`VerifyOutcome`] is kept for diagnostics and tests; callers that only
//! need admission semantics use [`VerifyOutcome::is_valid`].

mod jwks;
mod verifier;

pub use jwks::JwkKeySet;
pub use verifier::{SignatureVerifier, VerifyOutcome, ACCEPTED_ALGORITHMS};

use crate::token::DecodedToken;
use jsonwebtoken::DecodingKey;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Why no key could be produced for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Keyed verification needs a `kid` in the token header
    MissingKeyId,
    /// No key with this id in the key set
    UnknownKeyId { kid: String },
    /// Key material could not be parsed
    InvalidKeyMaterial { error: String },
    /// The key set document itself is malformed
    InvalidKeySet { error: String },
    /// Neither `public_key` nor `jwk_keys` was configured
    NotConfigured,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::MissingKeyId => write!(f, "token header has no 'kid'"),
            KeyError::UnknownKeyId { kid } => write!(f, "no key found for kid '{}'", kid),
            KeyError::InvalidKeyMaterial { error } => write!(f, "invalid key material: {}", error),
            KeyError::InvalidKeySet { error } => write!(f, "invalid key set: {}", error),
            KeyError::NotConfigured => write!(f, "no public key configured"),
        }
    }
}

impl std::error::Error for KeyError {}

/// Looks up a public key by key id.
pub trait KeyResolver: Send + Sync {
    /// Key for `kid`
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownKeyId`] if the id is not known, or
    /// [`KeyError::InvalidKeyMaterial`] if the stored key cannot be used.
    fn resolve(&self, kid: &str) -> Result<DecodingKey, KeyError>;
}

/// Where verification keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// One configured key. A PEM that failed to parse is kept as the error
    /// so every verification reports it instead of failing construction.
    Static(Result<DecodingKey, KeyError>),
    /// Per-token key selected by `kid`
    Keyed(Arc<dyn KeyResolver>),
    /// No key material at all; every verification fails
    Unconfigured,
}

impl KeySource {
    /// Parse a PEM-encoded RSA public key.
    ///
    /// A malformed PEM is logged once here and then surfaces as
    /// [`KeyError::InvalidKeyMaterial`] on each verification.
    pub fn from_pem(pem: &str) -> Self {
        let parsed = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            KeyError::InvalidKeyMaterial {
                error: format!("{:?}", e.kind()),
            }
        });
        if let Err(e) = &parsed {
            warn!(error = %e, "configured public_key could not be parsed; all tokens will be rejected");
        }
        KeySource::Static(parsed)
    }

    pub fn keyed(resolver: Arc<dyn KeyResolver>) -> Self {
        KeySource::Keyed(resolver)
    }

    /// Key to verify `decoded` with
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] when no usable key exists for the token.
    pub fn key_for(&self, decoded: &DecodedToken) -> Result<Cow<'_, DecodingKey>, KeyError> {
        match self {
            KeySource::Static(Ok(key)) => Ok(Cow::Borrowed(key)),
            KeySource::Static(Err(e)) => Err(e.clone()),
            KeySource::Keyed(resolver) => {
                let kid = decoded.kid().ok_or(KeyError::MissingKeyId)?;
                resolver.resolve(kid).map(Cow::Owned)
            }
            KeySource::Unconfigured => Err(KeyError::NotConfigured),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            KeySource::Static(_) => "static",
            KeySource::Keyed(_) => "keyed",
            KeySource::Unconfigured => "unconfigured",
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeySource::{}", self.describe())
    }
}
