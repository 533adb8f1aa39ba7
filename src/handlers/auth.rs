//! Auth handlers
//!
//! Sign-in endpoints and the bearer-token request extractor used by every
//! protected route.

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use futures_util::future::{ready, Ready};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Role, UserProfile};
use crate::services::auth::AuthError;
use crate::AppState;

use super::ApiResponse;

/// Authenticated caller, extracted from the Authorization header.
///
/// Verification is purely claim-based; handlers that need fresh user state
/// (active flag, balance) load the row themselves.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

impl AuthUser {
    /// Compare the caller's role against an allow-list
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} is not allowed to perform this operation",
                self.role
            )))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_auth_user(req))
    }
}

fn extract_auth_user(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state is missing".to_string()))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("expected a bearer token".to_string()))?;

    let claims = state
        .tokens
        .verify_access_token(token)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;

    Ok(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: claims.email,
    })
}

/// Request payload for password sign-in
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub password: String,
}

/// Request payload for Google sign-in
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

/// Request payload for token refresh
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request payload for PIN verification
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinVerifyRequest {
    pub pin: String,
}

/// Response payload for successful sign-in
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// POST /v1/auth/login
///
/// Password sign-in by username or email.
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let session = state
        .auth
        .login(&request.identifier, &request.password)
        .await
        .map_err(map_auth_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(SessionResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: session.user.to_profile(),
    })))
}

/// POST /v1/auth/google
///
/// Google sign-in; creates a customer account on first use.
pub async fn login_with_google(
    state: web::Data<AppState>,
    body: web::Json<GoogleLoginRequest>,
) -> Result<HttpResponse, AppError> {
    let session = state
        .auth
        .login_with_google(&body.into_inner().id_token)
        .await
        .map_err(map_auth_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(SessionResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: session.user.to_profile(),
    })))
}

/// POST /v1/auth/refresh
///
/// Exchange a refresh token for new session tokens.
pub async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, AppError> {
    let session = state
        .auth
        .refresh(&body.into_inner().refresh_token)
        .await
        .map_err(map_auth_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(SessionResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: session.user.to_profile(),
    })))
}

/// GET /v1/auth/me
///
/// Fresh profile for the authenticated caller.
pub async fn me(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, AppError> {
    let profile = state
        .auth
        .current_user(user.user_id)
        .await
        .map_err(map_auth_error)?
        .to_profile();

    Ok(HttpResponse::Ok().json(ApiResponse::new(profile)))
}

/// POST /v1/auth/pin/verify
///
/// Verify the caller's PIN ahead of a destructive operation.
pub async fn verify_pin(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<PinVerifyRequest>,
) -> Result<HttpResponse, AppError> {
    state
        .auth
        .verify_pin(user.user_id, &body.into_inner().pin)
        .await
        .map_err(map_auth_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(serde_json::json!({ "verified": true }))))
}

/// Map auth errors to application errors
pub fn map_auth_error(e: AuthError) -> AppError {
    match e {
        AuthError::InvalidCredentials => AppError::Unauthorized("invalid credentials".to_string()),
        AuthError::Inactive => AppError::Forbidden("account is deactivated".to_string()),
        AuthError::PinNotSet => AppError::Forbidden("account has no PIN configured".to_string()),
        AuthError::PinMismatch => AppError::Forbidden("PIN does not match".to_string()),
        AuthError::UserNotFound(id) => AppError::NotFound(format!("user not found: {id}")),
        AuthError::Google(msg) => AppError::Unauthorized(msg),
        AuthError::Token(e) => AppError::Unauthorized(e.to_string()),
        AuthError::Database(e) => AppError::Database(e),
    }
}

/// Configure auth routes
pub fn configure_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/login").route(web::post().to(login)));
    cfg.service(web::resource("/auth/google").route(web::post().to(login_with_google)));
    cfg.service(web::resource("/auth/refresh").route(web::post().to(refresh)));
    cfg.service(web::resource("/auth/me").route(web::get().to(me)));
    cfg.service(web::resource("/auth/pin/verify").route(web::post().to(verify_pin)));
}
