//! Inspection handlers
//!
//! Staff endpoints for the inspection lifecycle.

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CreateInspectionRequest, ListInspectionsQuery, Role, UpdateInspectionRequest,
};
use crate::services::inspection::InspectionError;
use crate::services::InspectionService;
use crate::AppState;

use super::auth::AuthUser;
use super::ApiResponse;

/// POST /v1/inspections
///
/// Create an inspection for the calling inspector's branch.
pub async fn create_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateInspectionRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Inspector, Role::Admin])?;

    // The branch comes from the inspector's own profile
    let branch_code = sqlx::query_scalar::<_, Option<String>>(
        "SELECT branch_code FROM users WHERE user_id = $1",
    )
    .bind(user.user_id)
    .fetch_optional(&state.db)
    .await?
    .flatten()
    .ok_or_else(|| AppError::Validation("inspector has no branch assigned".to_string()))?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .create(user.user_id, &branch_code, body.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(inspection)))
}

/// GET /v1/inspections
///
/// Staff listing with status filter and keyword search.
pub async fn list_inspections(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ListInspectionsQuery>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer, Role::Inspector])?;

    let service = InspectionService::new(state.db.clone());
    let page = service
        .list(query.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/// GET /v1/inspections/{inspectionId}
pub async fn get_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer, Role::Inspector])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .get(path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// PUT /v1/inspections/{inspectionId}
///
/// Review edits; changed fields land in the change log.
pub async fn update_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateInspectionRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .update(path.into_inner(), user.user_id, body.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// GET /v1/inspections/{inspectionId}/changelog
pub async fn get_change_log(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;

    let service = InspectionService::new(state.db.clone());
    let logs = service
        .change_log(path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(logs)))
}

/// POST /v1/inspections/{inspectionId}/approve
pub async fn approve_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .approve(path.into_inner(), user.user_id)
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// POST /v1/inspections/{inspectionId}/archive
///
/// Queue the NFT mint; the worker completes the archive once the asset is
/// confirmed on chain.
pub async fn archive_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .archive(path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Accepted().json(ApiResponse::new(inspection)))
}

/// POST /v1/inspections/{inspectionId}/deactivate
pub async fn deactivate_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .deactivate(path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// POST /v1/inspections/{inspectionId}/activate
pub async fn reactivate_inspection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .reactivate(path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// Map inspection errors to application errors
pub fn map_inspection_error(e: InspectionError) -> AppError {
    match e {
        InspectionError::NotFound(id) => AppError::NotFound(format!("inspection not found: {id}")),
        InspectionError::CodeNotFound(code) => {
            AppError::NotFound(format!("inspection not found: {code}"))
        }
        InspectionError::WrongStatus { expected, actual } => AppError::Conflict(format!(
            "inspection is {actual}, expected {expected}"
        )),
        InspectionError::Validation(msg) => AppError::Validation(msg),
        InspectionError::Database(e) => AppError::Database(e),
    }
}

/// Configure inspection routes
pub fn configure_inspection_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/inspections")
            .route(web::get().to(list_inspections))
            .route(web::post().to(create_inspection)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}")
            .route(web::get().to(get_inspection))
            .route(web::put().to(update_inspection)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}/changelog")
            .route(web::get().to(get_change_log)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}/approve")
            .route(web::post().to(approve_inspection)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}/archive")
            .route(web::post().to(archive_inspection)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}/deactivate")
            .route(web::post().to(deactivate_inspection)),
    );
    cfg.service(
        web::resource("/inspections/{inspectionId}/activate")
            .route(web::post().to(reactivate_inspection)),
    );
}
