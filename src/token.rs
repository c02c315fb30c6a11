use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Development-only fallback secret, used when no secret is configured.
const DEV_FALLBACK_SECRET: &str = "insecure-dev-secret";

/// Session token failure. Missing, malformed, badly signed and expired tokens
/// all collapse into one class so callers cannot tell which check failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidOrExpired,
}

/// Claims carried by a session token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Contact identifier (email or phone) the identity registered with
    pub contact: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Issues and verifies signed, time-limited session tokens.
///
/// Constructed once at startup and shared immutably; the signing key never
/// changes for the lifetime of the process.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service from the configured secret.
    ///
    /// An empty secret falls back to a fixed development default. That
    /// fallback must never carry real traffic, so it is logged loudly.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let secret = if secret.is_empty() {
            warn!("auth.jwt_secret is not set, falling back to the insecure development secret");
            DEV_FALLBACK_SECRET
        } else {
            secret
        };

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Mint a token for the given user, expiring `ttl` from now
    pub fn issue(&self, user_id: i64, contact: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            contact: contact.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidOrExpired)
    }

    /// Verify a token's signature and expiry, returning the user id.
    ///
    /// A token is valid strictly while `now < exp`; one whose expiry equals
    /// the current second is already rejected.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidOrExpired)?;

        if data.claims.exp <= chrono::Utc::now().timestamp() {
            return Err(AuthError::InvalidOrExpired);
        }

        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl: Duration) -> TokenService {
        TokenService::new("test-secret", ttl)
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let svc = service(Duration::from_secs(86_400));
        let token = svc.issue(42, "user@example.com").unwrap();

        assert_eq!(svc.verify(&token).unwrap(), 42);
        // Verification is stateless: repeated calls succeed identically.
        assert_eq!(svc.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service(Duration::from_secs(0));
        let token = svc.issue(42, "user@example.com").unwrap();

        // Expiry equals the issuance instant; `now < exp` no longer holds, so
        // the token is rejected with the same class as a malformed one.
        assert!(matches!(
            svc.verify(&token),
            Err(AuthError::InvalidOrExpired)
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let svc = service(Duration::from_secs(86_400));
        assert!(matches!(
            svc.verify("not-a-token"),
            Err(AuthError::InvalidOrExpired)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = TokenService::new("secret-a", Duration::from_secs(86_400));
        let verifier = TokenService::new("secret-b", Duration::from_secs(86_400));

        let token = issuer.issue(7, "+628123").unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_empty_secret_uses_fallback() {
        let a = TokenService::new("", Duration::from_secs(60));
        let b = TokenService::new("", Duration::from_secs(60));

        // Both instances share the fixed development fallback key.
        let token = a.issue(1, "x@y.z").unwrap();
        assert_eq!(b.verify(&token).unwrap(), 1);
    }
}
