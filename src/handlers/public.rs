//! Public handlers
//!
//! Unauthenticated read-only endpoints: inspection previews by plate or
//! code, and the inspector roster.

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::models::PublicSearchQuery;
use crate::services::InspectionService;
use crate::AppState;

use super::inspections::map_inspection_error;
use super::ApiResponse;

/// GET /v1/public/inspections
///
/// Search approved/archived inspections by plate number.
pub async fn search_inspections(
    state: web::Data<AppState>,
    query: web::Query<PublicSearchQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();

    let service = InspectionService::new(state.db.clone());
    let page = service
        .search_public(query.plate.as_deref(), query.page, query.page_size)
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/// GET /v1/public/inspections/{code}
pub async fn get_inspection_by_code(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let service = InspectionService::new(state.db.clone());
    let inspection = service
        .get_public_by_code(&path.into_inner())
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspection)))
}

/// GET /v1/public/inspectors
pub async fn list_inspectors(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let service = InspectionService::new(state.db.clone());
    let inspectors = service
        .list_public_inspectors()
        .await
        .map_err(map_inspection_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(inspectors)))
}

/// Configure public routes
pub fn configure_public_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/public/inspections").route(web::get().to(search_inspections)));
    cfg.service(
        web::resource("/public/inspections/{code}").route(web::get().to(get_inspection_by_code)),
    );
    cfg.service(web::resource("/public/inspectors").route(web::get().to(list_inspectors)));
}
