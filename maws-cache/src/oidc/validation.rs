//! JWT signature and audience verification against a supplied JWKS.

use crate::oidc::token::IdTokenClaims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("No key in JWKS matches kid {0:?}")]
    KeyNotFound(Option<String>),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid audience")]
    InvalidAudience,
}

/// Verifies ID tokens for one client against key material fetched elsewhere.
///
/// Expiry is deliberately not checked here: the cache applies its own clock
/// skew allowance to `exp` after the token has been verified.
pub struct TokenValidator<'a> {
    audience: &'a str,
    jwks: &'a JwkSet,
}

impl<'a> TokenValidator<'a> {
    pub fn new(audience: &'a str, jwks: &'a JwkSet) -> Self {
        Self { audience, jwks }
    }

    /// Validate a token and return the claims
    pub fn validate(&self, token: &str) -> Result<IdTokenClaims, ValidationError> {
        let header =
            decode_header(token).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        // Tokens with a kid must use that key; without one, any key may match
        let candidates: Vec<&Jwk> = match header.kid.as_deref() {
            Some(kid) => self
                .jwks
                .keys
                .iter()
                .filter(|jwk| jwk.common.key_id.as_deref() == Some(kid))
                .collect(),
            None => self.jwks.keys.iter().collect(),
        };

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.audience]);
        validation.validate_exp = false;

        let mut last_error = ValidationError::KeyNotFound(header.kid.clone());

        for jwk in candidates {
            let decoding_key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    last_error = ValidationError::UnsupportedAlgorithm(format!("Invalid JWK: {e}"));
                    continue;
                }
            };

            match decode::<IdTokenClaims>(token, &decoding_key, &validation) {
                Ok(token_data) => return Ok(token_data.claims),
                Err(e) => {
                    let error = classify(e);
                    // Neither failure depends on which key was tried
                    if matches!(error, ValidationError::InvalidAudience | ValidationError::Malformed(_)) {
                        return Err(error);
                    }
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}

fn classify(error: jsonwebtoken::errors::Error) -> ValidationError {
    match error.kind() {
        ErrorKind::InvalidSignature => ValidationError::InvalidSignature(error.to_string()),
        ErrorKind::InvalidAudience => ValidationError::InvalidAudience,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => ValidationError::UnsupportedAlgorithm(error.to_string()),
        _ => ValidationError::Malformed(error.to_string()),
    }
}
