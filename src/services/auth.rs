//! Auth Service
//!
//! Password and Google sign-in, token refresh, and PIN verification for
//! destructive admin operations.

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::User;
use crate::services::token::{self, TokenError, TokenService};

/// Default Google token verification endpoint
const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Errors that can occur during authentication
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    Inactive,

    #[error("Account has no PIN configured")]
    PinNotSet,

    #[error("PIN does not match")]
    PinMismatch,

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Google sign-in failed: {0}")]
    Google(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Issued session tokens plus the signed-in profile
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Claims returned by Google's tokeninfo endpoint, reduced to what we use
#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Verifies Google ID tokens against the tokeninfo endpoint
#[derive(Clone)]
pub struct GoogleVerifier {
    http: reqwest::Client,
    tokeninfo_url: String,
    client_id: String,
}

impl GoogleVerifier {
    pub fn new(client_id: String) -> Self {
        let tokeninfo_url = std::env::var("GOOGLE_TOKENINFO_URL")
            .unwrap_or_else(|_| DEFAULT_TOKENINFO_URL.to_string());
        Self {
            http: reqwest::Client::new(),
            tokeninfo_url,
            client_id,
        }
    }

    /// Verify an ID token and return (google subject, email, display name)
    async fn verify(&self, id_token: &str) -> Result<(String, String, Option<String>), AuthError> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| AuthError::Google(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Google(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: GoogleTokenInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Google(e.to_string()))?;

        if info.aud != self.client_id {
            return Err(AuthError::Google("token audience mismatch".to_string()));
        }
        if info.email_verified.as_deref() == Some("false") {
            return Err(AuthError::Google("email is not verified".to_string()));
        }

        Ok((info.sub, info.email, info.name))
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    tokens: TokenService,
    google: Option<GoogleVerifier>,
}

impl AuthService {
    pub fn new(pool: PgPool, tokens: TokenService, google: Option<GoogleVerifier>) -> Self {
        Self {
            pool,
            tokens,
            google,
        }
    }

    /// Password sign-in by username or email
    pub async fn login(&self, identifier: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, email, full_name, role, password_hash, pin_hash,
                   google_sub, wallet_address, branch_code, credit_balance, is_active,
                   created_at, updated_at
            FROM users
            WHERE username = $1 OR email = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !token::verify_secret(password, hash)? {
            warn!(username = %user.username, "Password sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        info!(user_id = %user.user_id, role = %user.role, "User signed in");
        self.issue_session(user)
    }

    /// Google sign-in; creates a customer account on first sight of the
    /// Google subject
    pub async fn login_with_google(&self, id_token: &str) -> Result<SessionTokens, AuthError> {
        let verifier = self
            .google
            .as_ref()
            .ok_or_else(|| AuthError::Google("Google sign-in is not configured".to_string()))?;
        let (sub, email, name) = verifier.verify(id_token).await?;

        if let Some(user) = self.find_by_google_sub(&sub).await? {
            if !user.is_active {
                return Err(AuthError::Inactive);
            }
            return self.issue_session(user);
        }

        // First sign-in: derive a username from the email local part,
        // suffixed to dodge collisions
        let local_part = email.split('@').next().unwrap_or("customer");
        let username = format!("{}-{}", local_part, &sub[sub.len().saturating_sub(6)..]);
        let full_name = name.unwrap_or_else(|| local_part.to_string());

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, username, email, full_name, role, google_sub)
            VALUES ($1, $2, $3, $4, 'customer', $5)
            ON CONFLICT (google_sub) DO UPDATE SET updated_at = NOW()
            RETURNING user_id, username, email, full_name, role, password_hash, pin_hash,
                      google_sub, wallet_address, branch_code, credit_balance, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&username)
        .bind(&email)
        .bind(&full_name)
        .bind(&sub)
        .fetch_one(&self.pool)
        .await?;

        info!(user_id = %user.user_id, "Customer account created via Google sign-in");
        self.issue_session(user)
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;
        let user = self
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound(claims.sub))?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        self.issue_session(user)
    }

    /// Verify a user's PIN. Destructive admin operations call this before
    /// acting.
    pub async fn verify_pin(&self, user_id: Uuid, pin: &str) -> Result<(), AuthError> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound(user_id))?;
        let hash = user.pin_hash.as_deref().ok_or(AuthError::PinNotSet)?;
        if !token::verify_secret(pin, hash)? {
            warn!(user_id = %user_id, "PIN verification failed");
            return Err(AuthError::PinMismatch);
        }
        Ok(())
    }

    /// Load the current profile for the `me` endpoint
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound(user_id))
    }

    fn issue_session(&self, user: User) -> Result<SessionTokens, AuthError> {
        let access_token = self
            .tokens
            .issue_access_token(user.user_id, user.role, &user.email)?;
        let refresh_token = self.tokens.issue_refresh_token(user.user_id)?;
        Ok(SessionTokens {
            access_token,
            refresh_token,
            user,
        })
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, email, full_name, role, password_hash, pin_hash,
                   google_sub, wallet_address, branch_code, credit_balance, is_active,
                   created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_google_sub(&self, sub: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, email, full_name, role, password_hash, pin_hash,
                   google_sub, wallet_address, branch_code, credit_balance, is_active,
                   created_at, updated_at
            FROM users
            WHERE google_sub = $1
            "#,
        )
        .bind(sub)
        .fetch_optional(&self.pool)
        .await
    }
}

