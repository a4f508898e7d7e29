//! Session tokens: short-lived, HS256-signed, minted after a passed captcha
//! challenge and accepted by the render endpoint in place of (or alongside)
//! an API key.
//!
//! Grounded on estuary-flow's JWT-based control-plane auth tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DEFAULT_TTL_SECONDS: i64 = 1800;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Opaque subject identifying the captcha-verified client, not a user account.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    pub fn mint(&self, subject: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::render_failed(format!("failed to mint session token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        let validation = Validation::default();
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(AppError::session_token_expired("session token expired"))
                }
                _ => Err(AppError::session_token_invalid(format!("invalid session token: {e}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_verify_roundtrip() {
        let tokens = SessionTokens::new("test-secret");
        let token = tokens.mint("captcha-session-1").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "captcha-session-1");
    }

    #[test]
    fn verify_rejects_garbage() {
        let tokens = SessionTokens::new("test-secret");
        assert!(tokens.verify("not.a.token").is_err());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let minted = SessionTokens::new("secret-a").mint("sub").unwrap();
        let verifier = SessionTokens::new("secret-b");
        assert!(verifier.verify(&minted).is_err());
    }

    #[test]
    fn expired_token_reports_expired_code() {
        let mut tokens = SessionTokens::new("test-secret");
        tokens.ttl = Duration::seconds(-1);
        let token = tokens.mint("sub").unwrap();
        let err = tokens.verify(&token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::SessionTokenExpired);
    }
}
