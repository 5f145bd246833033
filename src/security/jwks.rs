use super::{KeyError, KeyResolver};
use jsonwebtoken::DecodingKey;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Static JSON Web Key Set supplied through configuration.
///
/// Only RSA signing keys are kept, since RS256 is the only accepted
/// algorithm. Keys without a `kid`, with a non-RS256 `alg`, or with
/// unusable components are skipped with a warning.
#[derive(Clone)]
pub struct JwkKeySet {
    keys: HashMap<String, DecodingKey>,
}

impl JwkKeySet {
    /// Parse a serialized key set (`{"keys": [...]}`)
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeySet`] if the document is not JSON or has
    /// no `keys` array.
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        let parsed: Value = serde_json::from_str(json).map_err(|e| KeyError::InvalidKeySet {
            error: e.to_string(),
        })?;
        Self::from_value(&parsed)
    }

    /// Build from an already-parsed key set document
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeySet`] if there is no `keys` array.
    pub fn from_value(doc: &Value) -> Result<Self, KeyError> {
        let entries = doc
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| KeyError::InvalidKeySet {
                error: "missing 'keys' array".to_string(),
            })?;

        let mut keys = HashMap::new();
        for k in entries {
            let kid = match k.get("kid").and_then(Value::as_str) {
                Some(kid) if !kid.is_empty() => kid,
                _ => {
                    warn!("skipping JWK without 'kid'");
                    continue;
                }
            };
            let kty = k.get("kty").and_then(Value::as_str).unwrap_or("");
            if !kty.eq_ignore_ascii_case("RSA") {
                debug!(kid, kty, "skipping non-RSA JWK");
                continue;
            }
            if let Some(alg) = k.get("alg").and_then(Value::as_str) {
                if !alg.eq_ignore_ascii_case("RS256") {
                    debug!(kid, alg, "skipping JWK for unsupported algorithm");
                    continue;
                }
            }
            let (n, e) = match (
                k.get("n").and_then(Value::as_str),
                k.get("e").and_then(Value::as_str),
            ) {
                (Some(n), Some(e)) => (n, e),
                _ => {
                    warn!(kid, "skipping RSA JWK without modulus/exponent");
                    continue;
                }
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(dk) => {
                    keys.insert(kid.to_string(), dk);
                }
                Err(err) => {
                    warn!(kid, error = ?err.kind(), "skipping RSA JWK with invalid components");
                }
            }
        }
        debug!(keys = keys.len(), "loaded JWK key set");
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }
}

impl KeyResolver for JwkKeySet {
    fn resolve(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::UnknownKeyId {
                kid: kid.to_string(),
            })
    }
}
