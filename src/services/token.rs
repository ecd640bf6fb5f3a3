// src/services/token.rs

//! Signed reader tokens embedded in digest links.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// What a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Unsubscribe,
    Subscribe,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Unsubscribe => "unsubscribe",
            TokenPurpose::Subscribe => "subscribe",
        }
    }

    /// Subscribe confirmations expire; unsubscribe links do not.
    fn lifetime(&self) -> Option<Duration> {
        match self {
            TokenPurpose::Subscribe => Some(Duration::minutes(30)),
            TokenPurpose::Unsubscribe => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Sign an HS256 token for a reader.
pub fn sign_token(uid: &str, purpose: TokenPurpose, key: &str, now: DateTime<Utc>) -> Result<String> {
    if key.is_empty() {
        return Err(AppError::config("token signing key is not set"));
    }

    let claims = TokenClaims {
        sub: purpose.as_str().to_string(),
        iat: now.timestamp(),
        uid: uid.to_string(),
        exp: purpose.lifetime().map(|ttl| (now + ttl).timestamp()),
    };

    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )?)
}

/// Verify a token's signature (and expiry, when it carries one).
pub fn verify_token(token: &str, key: &str) -> Result<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = HashSet::new();

    let data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_token_has_no_expiry() {
        let token = sign_token("r1", TokenPurpose::Unsubscribe, "secret", Utc::now()).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "unsubscribe");
        assert_eq!(claims.uid, "r1");
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn subscribe_token_expires_after_thirty_minutes() {
        let now = Utc::now();
        let token = sign_token("r1", TokenPurpose::Subscribe, "secret", now).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.exp, Some(now.timestamp() + 30 * 60));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_token("r1", TokenPurpose::Unsubscribe, "secret", Utc::now()).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn empty_key_is_a_config_error() {
        let err = sign_token("r1", TokenPurpose::Unsubscribe, "", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
