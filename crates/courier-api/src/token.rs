use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use tracing::debug;

use courier_types::api::Claims;
use courier_types::{StoreError, UserId};

/// A signed, self-contained session credential. Nothing is stored server-side.
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: UserId) -> Result<SessionToken, StoreError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp().max(0) as usize,
            exp: expires_at.timestamp().max(0) as usize,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| StoreError::storage(anyhow::anyhow!("Failed to sign session token: {}", e)))?;

        Ok(SessionToken { token, expires_at })
    }

    /// Check signature and expiry. Any failure is reported as
    /// [`StoreError::Authentication`].
    pub fn verify(&self, token: &str) -> Result<Claims, StoreError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected session token: {}", e);
                StoreError::Authentication
            })
    }
}
