//! Token Service
//!
//! Issues and verifies the bearer tokens used by staff and customer
//! sessions, and hashes the password/PIN secrets they are derived from.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

/// Errors that can occur while issuing or verifying credentials
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Credential hashing failed: {0}")]
    Hashing(String),
}

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User id
    pub sub: Uuid,
    /// Role at issue time; the allow-list check compares against this
    pub role: Role,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    /// Token id
    pub jti: String,
}

/// Claims carried by a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Stateless JWT issuer/verifier shared across handlers
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: String, access_ttl_minutes: i64, refresh_ttl_days: i64) -> Self {
        Self {
            secret,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    /// Issue an access token for a user
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        role: Role,
        email: &str,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id,
            role,
            email: email.to_string(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Issue a refresh token for a user
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshTokenClaims {
            sub: user_id,
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify an access token's signature and expiry
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| TokenError::InvalidToken)
    }

    /// Verify a refresh token's signature and expiry
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        decode::<RefreshTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| TokenError::InvalidToken)
    }
}

/// Hash a password or PIN with Argon2id and a random salt
pub fn hash_secret(secret: &str) -> Result<String, TokenError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TokenError::Hashing(e.to_string()))
}

/// Verify a password or PIN against a stored hash
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, TokenError> {
    let parsed = PasswordHash::new(hash).map_err(|e| TokenError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}
