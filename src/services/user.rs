//! User Service
//!
//! Admin-facing account management.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::{CreateUserRequest, Paginated, Role, UpdateUserRequest, User, UserProfile};
use crate::services::token::{self, TokenError};

/// Default page size for listings
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size for listings
const MAX_PAGE_SIZE: i64 = 100;

/// Errors that can occur during user management
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(Uuid),

    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    #[error("Invalid user data: {0}")]
    Validation(String),

    #[error("Cannot delete own account")]
    SelfDelete,

    #[error("Credential hashing failed: {0}")]
    Token(#[from] TokenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for account management
#[derive(Debug, Clone)]
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List accounts, optionally filtered by role
    pub async fn list(
        &self,
        role: Option<Role>,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Paginated<UserProfile>, UserError> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, email, full_name, role, password_hash, pin_hash,
                   google_sub, wallet_address, branch_code, credit_balance, is_active,
                   created_at, updated_at
            FROM users
            WHERE $1::user_role IS NULL OR role = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(role)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE $1::user_role IS NULL OR role = $1",
        )
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paginated {
            items: users.iter().map(User::to_profile).collect(),
            page,
            page_size,
            total,
        })
    }

    /// Get an account by id
    pub async fn get(&self, user_id: Uuid) -> Result<User, UserError> {
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
        .await?
        .ok_or(UserError::NotFound(user_id))
    }

    /// Create an account.
    ///
    /// Staff roles must come with a password; admins additionally get a PIN
    /// for destructive operations.
    pub async fn create(&self, request: CreateUserRequest) -> Result<User, UserError> {
        validate_username(&request.username)?;
        validate_email(&request.email)?;

        let needs_password = !matches!(request.role, Role::Customer);
        if needs_password && request.password.is_none() {
            return Err(UserError::Validation(format!(
                "a password is required for role {}",
                request.role
            )));
        }
        if request.role == Role::Admin && request.pin.is_none() {
            return Err(UserError::Validation(
                "an admin account requires a PIN".to_string(),
            ));
        }

        let password_hash = match &request.password {
            Some(password) => Some(token::hash_secret(password)?),
            None => None,
        };
        let pin_hash = match &request.pin {
            Some(pin) => {
                validate_pin(pin)?;
                Some(token::hash_secret(pin)?)
            }
            None => None,
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, username, email, full_name, role, password_hash,
                               pin_hash, wallet_address, branch_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING user_id, username, email, full_name, role, password_hash, pin_hash,
                      google_sub, wallet_address, branch_code, credit_balance, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(request.role)
        .bind(password_hash)
        .bind(pin_hash)
        .bind(&request.wallet_address)
        .bind(&request.branch_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                UserError::Duplicate("username, email or wallet address")
            } else {
                UserError::Database(e)
            }
        })?;

        info!(user_id = %user.user_id, role = %user.role, "Account created");
        Ok(user)
    }

    /// Update an account's profile fields
    pub async fn update(&self, user_id: Uuid, request: UpdateUserRequest) -> Result<User, UserError> {
        if let Some(email) = &request.email {
            validate_email(email)?;
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                role = COALESCE($4, role),
                wallet_address = COALESCE($5, wallet_address),
                branch_code = COALESCE($6, branch_code),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, username, email, full_name, role, password_hash, pin_hash,
                      google_sub, wallet_address, branch_code, credit_balance, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(request.role)
        .bind(&request.wallet_address)
        .bind(&request.branch_code)
        .bind(request.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                UserError::Duplicate("email or wallet address")
            } else {
                UserError::Database(e)
            }
        })?
        .ok_or(UserError::NotFound(user_id))?;

        info!(user_id = %user_id, "Account updated");
        Ok(user)
    }

    /// Delete an account. The caller cannot delete itself; PIN verification
    /// happens in the handler before this is reached.
    pub async fn delete(&self, user_id: Uuid, caller_id: Uuid) -> Result<(), UserError> {
        if user_id == caller_id {
            return Err(UserError::SelfDelete);
        }

        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(user_id));
        }

        info!(user_id = %user_id, "Account deleted");
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), UserError> {
    if username.len() < 3 || username.len() > 64 {
        return Err(UserError::Validation(
            "username must be 3-64 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(UserError::Validation(
            "username may only contain letters, digits, '-', '_' and '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(UserError::Validation("email must contain '@'".to_string()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(UserError::Validation("email is malformed".to_string()));
    }
    Ok(())
}

fn validate_pin(pin: &str) -> Result<(), UserError> {
    if pin.len() < 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(UserError::Validation(
            "PIN must be at least 6 digits".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_validation() {
        assert!(validate_username("inspector.yog-01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("bad name").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("staff@example.com").is_ok());
        assert!(validate_email("staff@").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("x@nodot").is_err());
    }

    #[test]
    fn test_pin_validation() {
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("12a456").is_err());
    }
}
