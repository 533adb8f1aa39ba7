//! Credit handlers
//!
//! Credit package administration, the customer storefront listing, balance
//! lookup, and the credit-charged report download.

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CreateCreditPackageRequest, CreditBalance, Role, UpdateCreditPackageRequest,
};
use crate::services::credit::CreditError;
use crate::services::CreditService;
use crate::AppState;

use super::auth::AuthUser;
use super::ApiResponse;

/// GET /v1/credit-packages
///
/// Staff see all packages; customers see only active ones.
pub async fn list_packages(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let active_only = user.role == Role::Customer;
    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let packages = service
        .list_packages(active_only)
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(packages)))
}

/// GET /v1/credit-packages/{packageId}
pub async fn get_package(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let package = service
        .get_package(path.into_inner())
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(package)))
}

/// POST /v1/credit-packages
pub async fn create_package(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateCreditPackageRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let package = service
        .create_package(body.into_inner())
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(package)))
}

/// PUT /v1/credit-packages/{packageId}
pub async fn update_package(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCreditPackageRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let package = service
        .update_package(path.into_inner(), body.into_inner())
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(package)))
}

/// DELETE /v1/credit-packages/{packageId}
pub async fn delete_package(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin])?;

    let service = CreditService::new(state.db.clone(), state.storage.clone());
    service
        .delete_package(path.into_inner())
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /v1/credits/balance
pub async fn get_balance(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let credit_balance = service
        .balance(user.user_id)
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(CreditBalance { credit_balance })))
}

/// POST /v1/inspections/{inspectionId}/download
///
/// Spend one credit for a report, idempotently per distinct report.
pub async fn download_report(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Customer])?;

    let service = CreditService::new(state.db.clone(), state.storage.clone());
    let download = service
        .download_report(user.user_id, path.into_inner())
        .await
        .map_err(map_credit_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(download)))
}

/// Map credit errors to application errors
fn map_credit_error(e: CreditError) -> AppError {
    match e {
        CreditError::PackageNotFound(id) => {
            AppError::NotFound(format!("credit package not found: {id}"))
        }
        CreditError::InspectionNotFound(id) => {
            AppError::NotFound(format!("inspection not found: {id}"))
        }
        CreditError::DuplicateName => AppError::Conflict("duplicate package name".to_string()),
        CreditError::PackageInUse => AppError::Conflict(
            "package has purchases and can only be deactivated".to_string(),
        ),
        CreditError::ReportUnavailable(status) => {
            AppError::Conflict(format!("report is not downloadable while {status}"))
        }
        CreditError::InsufficientCredits => {
            AppError::PaymentRequired("credit balance is empty".to_string())
        }
        CreditError::Validation(msg) => AppError::Validation(msg),
        CreditError::Storage(e) => AppError::Upstream(e.to_string()),
        CreditError::Database(e) => AppError::Database(e),
    }
}

/// Configure credit routes
pub fn configure_credit_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/credit-packages")
            .route(web::get().to(list_packages))
            .route(web::post().to(create_package)),
    );
    cfg.service(
        web::resource("/credit-packages/{packageId}")
            .route(web::get().to(get_package))
            .route(web::put().to(update_package))
            .route(web::delete().to(delete_package)),
    );
    cfg.service(web::resource("/credits/balance").route(web::get().to(get_balance)));
    cfg.service(
        web::resource("/inspections/{inspectionId}/download")
            .route(web::post().to(download_report)),
    );
}
