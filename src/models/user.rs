//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role assigned to a platform account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Reviewer,
    Inspector,
    Customer,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Reviewer => "REVIEWER",
            Self::Inspector => "INSPECTOR",
            Self::Customer => "CUSTOMER",
            Self::Developer => "DEVELOPER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "REVIEWER" => Some(Self::Reviewer),
            "INSPECTOR" => Some(Self::Inspector),
            "CUSTOMER" => Some(Self::Customer),
            "DEVELOPER" => Some(Self::Developer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User entity
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub pin_hash: Option<String>,
    pub google_sub: Option<String>,
    pub wallet_address: Option<String>,
    pub branch_code: Option<String>,
    pub credit_balance: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public view of this account, without credential material
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            wallet_address: self.wallet_address.clone(),
            branch_code: self.branch_code.clone(),
            credit_balance: self.credit_balance,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// User fields safe to return to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub wallet_address: Option<String>,
    pub branch_code: Option<String>,
    pub credit_balance: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request payload for creating an account (admin only)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password: Option<String>,
    pub pin: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub branch_code: Option<String>,
}

/// Request payload for updating an account (admin only)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub wallet_address: Option<String>,
    pub branch_code: Option<String>,
    pub is_active: Option<bool>,
}

/// Request payload for deleting an account; requires the caller's PIN
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserRequest {
    pub pin: String,
}

/// Query parameters for the user listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// Generic paginated listing wrapper
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}
