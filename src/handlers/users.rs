//! User handlers
//!
//! Admin-only account management endpoints.

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CreateUserRequest, DeleteUserRequest, ListUsersQuery, Role, UpdateUserRequest,
};
use crate::services::user::UserError;
use crate::services::UserService;
use crate::AppState;

use super::auth::{map_auth_error, AuthUser};
use super::ApiResponse;

/// GET /v1/users
///
/// List accounts, optionally filtered by role.
pub async fn list_users(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ListUsersQuery>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;
    let query = query.into_inner();

    let service = UserService::new(state.db.clone());
    let page = service
        .list(query.role, query.page, query.page_size)
        .await
        .map_err(map_user_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/// GET /v1/users/{userId}
pub async fn get_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = UserService::new(state.db.clone());
    let found = service.get(path.into_inner()).await.map_err(map_user_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(found.to_profile())))
}

/// POST /v1/users
///
/// Create a staff or customer account.
pub async fn create_user(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = UserService::new(state.db.clone());
    let created = service
        .create(body.into_inner())
        .await
        .map_err(map_user_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(created.to_profile())))
}

/// PUT /v1/users/{userId}
pub async fn update_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = UserService::new(state.db.clone());
    let updated = service
        .update(path.into_inner(), body.into_inner())
        .await
        .map_err(map_user_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(updated.to_profile())))
}

/// DELETE /v1/users/{userId}
///
/// Delete an account. Confirmed by the calling admin's PIN.
pub async fn delete_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<DeleteUserRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    state
        .auth
        .verify_pin(user.user_id, &body.into_inner().pin)
        .await
        .map_err(map_auth_error)?;

    let service = UserService::new(state.db.clone());
    service
        .delete(path.into_inner(), user.user_id)
        .await
        .map_err(map_user_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// Map user errors to application errors
fn map_user_error(e: UserError) -> AppError {
    match e {
        UserError::NotFound(id) => AppError::NotFound(format!("user not found: {id}")),
        UserError::Duplicate(what) => AppError::Conflict(format!("duplicate {what}")),
        UserError::Validation(msg) => AppError::Validation(msg),
        UserError::SelfDelete => AppError::Conflict("cannot delete own account".to_string()),
        UserError::Token(e) => AppError::Internal(e.to_string()),
        UserError::Database(e) => AppError::Database(e),
    }
}

/// Configure user management routes
pub fn configure_user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/users")
            .route(web::get().to(list_users))
            .route(web::post().to(create_user)),
    );
    cfg.service(
        web::resource("/users/{userId}")
            .route(web::get().to(get_user))
            .route(web::put().to(update_user))
            .route(web::delete().to(delete_user)),
    );
}
