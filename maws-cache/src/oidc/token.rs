//! Cached ID token documents and their claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The token response kept in the cache.
///
/// Only `id_token` is required; the rest of the OIDC token response
/// (`access_token`, `expires_in`, ...) is carried through unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdToken {
    pub id_token: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdToken {
    pub fn new(id_token: impl Into<String>) -> Self {
        Self {
            id_token: id_token.into(),
            extra: Map::new(),
        }
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("fields", &self.extra.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Claims of an ID token whose signature and audience have been verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Expiration time
    pub exp: i64,

    /// Audience
    pub aud: StringOrVec,

    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,

    /// Subject
    #[serde(default)]
    pub sub: Option<String>,

    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,

    /// Everything else, e.g. group or role claims
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Handle audience as string or array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrVec {
    String(String),
    Vec(Vec<String>),
}

impl StringOrVec {
    /// Check if the audience contains a specific value
    pub fn contains(&self, value: &str) -> bool {
        match self {
            StringOrVec::String(s) => s == value,
            StringOrVec::Vec(v) => v.iter().any(|s| s == value),
        }
    }
}

/// A cached token together with its verified claims
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    pub token: IdToken,
    pub claims: IdTokenClaims,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_token_keeps_response_fields() {
        let response = json!({
            "id_token": "eyJ.header.sig",
            "access_token": "opaque",
            "expires_in": 3600,
            "token_type": "Bearer"
        });

        let token: IdToken = serde_json::from_value(response.clone()).unwrap();
        assert_eq!(token.id_token, "eyJ.header.sig");
        assert_eq!(token.extra["expires_in"], 3600);
        assert_eq!(serde_json::to_value(&token).unwrap(), response);
    }

    #[test]
    fn test_id_token_requires_id_token_field() {
        assert!(serde_json::from_value::<IdToken>(json!({"access_token": "x"})).is_err());
    }

    #[test]
    fn test_id_token_debug_hides_token() {
        let mut token = IdToken::new("secret.jwt.value");
        token.extra.insert("access_token".into(), json!("also-secret"));

        let debug = format!("{token:?}");
        assert!(!debug.contains("secret.jwt.value"));
        assert!(!debug.contains("also-secret"));
        assert!(debug.contains("access_token"));
    }

    #[test]
    fn test_claims_collect_extra_fields() {
        let claims: IdTokenClaims = serde_json::from_value(json!({
            "exp": 1893456000,
            "aud": ["client123", "other"],
            "iss": "https://auth.example.com/",
            "amr": ["github"]
        }))
        .unwrap();

        assert_eq!(claims.exp, 1893456000);
        assert!(claims.aud.contains("client123"));
        assert_eq!(claims.iss.as_deref(), Some("https://auth.example.com/"));
        assert!(claims.sub.is_none());
        assert_eq!(claims.other["amr"], json!(["github"]));
    }

    #[test]
    fn test_string_or_vec_contains() {
        let single = StringOrVec::String("client123".to_string());
        assert!(single.contains("client123"));
        assert!(!single.contains("other"));

        let multiple = StringOrVec::Vec(vec!["client123".to_string(), "other-client".to_string()]);
        assert!(multiple.contains("client123"));
        assert!(multiple.contains("other-client"));
        assert!(!multiple.contains("unknown"));
    }
}
