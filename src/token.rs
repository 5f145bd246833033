//! Compact JWS decoding without signature verification.
//!
//! [`decode`] splits a bearer token into its header and claims payload so the
//! filter can read the key id, the expiry and the product list before (and
//! independently of) cryptographic verification. Nothing returned from here
//! is trusted until [`crate::security::SignatureVerifier`] says so.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde_json::{Map, Value};
use std::fmt;

/// Claim names used by the filter
pub mod claim {
    pub const ISSUED_AT: &str = "iat";
    pub const EXPIRES_AT: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const APPLICATION_NAME: &str = "application_name";
    pub const CLIENT_ID: &str = "client_id";
    pub const API_PRODUCT_LIST: &str = "api_product_list";
}

// JWS segments are base64url; some issuers pad, most don't.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Compact serialization requires exactly three dot-separated segments
    WrongSegmentCount { found: usize },
    /// The header segment is not a base64url-encoded JOSE header
    InvalidHeader { error: String },
    /// The payload segment is not valid base64url
    InvalidEncoding { error: String },
    /// The payload is not valid JSON
    InvalidPayload { error: String },
    /// The payload is JSON but not an object
    PayloadNotObject,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::WrongSegmentCount { found } => {
                write!(f, "malformed token: expected 3 segments, found {}", found)
            }
            TokenError::InvalidHeader { error } => {
                write!(f, "malformed token: invalid header - {}", error)
            }
            TokenError::InvalidEncoding { error } => {
                write!(f, "malformed token: invalid payload encoding - {}", error)
            }
            TokenError::InvalidPayload { error } => {
                write!(f, "malformed token: invalid payload JSON - {}", error)
            }
            TokenError::PayloadNotObject => {
                write!(f, "malformed token: payload is not a JSON object")
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Claims payload of a token.
///
/// Recognised claims get typed accessors; everything else is carried through
/// untouched and is opaque to the filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Expiry (`exp`) in seconds since the epoch
    pub fn expires_at(&self) -> Option<i64> {
        numeric_date(self.0.get(claim::EXPIRES_AT))
    }

    /// Issued-at (`iat`) in seconds since the epoch
    pub fn issued_at(&self) -> Option<i64> {
        numeric_date(self.0.get(claim::ISSUED_AT))
    }

    /// Not-before (`nbf`) in seconds since the epoch
    pub fn not_before(&self) -> Option<i64> {
        numeric_date(self.0.get(claim::NOT_BEFORE))
    }

    pub fn application_name(&self) -> Option<&str> {
        self.0.get(claim::APPLICATION_NAME).and_then(Value::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.0.get(claim::CLIENT_ID).and_then(Value::as_str)
    }

    /// Products the caller is entitled to.
    ///
    /// Accepts a JSON array of strings or a single comma-separated string.
    pub fn api_product_list(&self) -> Vec<&str> {
        match self.0.get(claim::API_PRODUCT_LIST) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Copy of the claims without the given names
    pub fn without(&self, names: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// NumericDate may legally carry a fractional part.
fn numeric_date(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

/// A token split into header and claims. The signature is not checked.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: jsonwebtoken::Header,
    pub claims: Claims,
}

impl DecodedToken {
    /// Key id from the header
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

/// Decode a compact JWS into header and claims.
///
/// # Errors
///
/// Returns a [`TokenError`] if the string is not a three-segment compact JWS
/// with a valid JOSE header and a JSON object payload.
pub fn decode(token: &str) -> Result<DecodedToken, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::WrongSegmentCount {
            found: segments.len(),
        });
    }

    let header = jsonwebtoken::decode_header(token).map_err(|e| TokenError::InvalidHeader {
        error: format!("{:?}", e.kind()),
    })?;

    let payload_bytes = SEGMENT_ENGINE
        .decode(segments[1])
        .map_err(|e| TokenError::InvalidEncoding {
            error: e.to_string(),
        })?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|e| TokenError::InvalidPayload {
            error: e.to_string(),
        })?;

    match payload {
        Value::Object(map) => Ok(DecodedToken {
            header,
            claims: Claims::new(map),
        }),
        _ => Err(TokenError::PayloadNotObject),
    }
}
