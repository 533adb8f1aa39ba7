//! Dashboard handlers
//!
//! Staff statistics endpoints.

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::models::{Role, StatsQuery, TrendQuery};
use crate::services::dashboard::DashboardError;
use crate::services::DashboardService;
use crate::AppState;

use super::auth::AuthUser;
use super::ApiResponse;

/// GET /v1/dashboard/stats
pub async fn get_stats(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;
    let query = query.into_inner();

    let service = DashboardService::new(state.db.clone());
    let stats = service
        .stats(query.start, query.end)
        .await
        .map_err(map_dashboard_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(stats)))
}

/// GET /v1/dashboard/trend
///
/// Zero-filled trend buckets over a range, in the viewer's UTC offset.
pub async fn get_trend(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<TrendQuery>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;
    let query = query.into_inner();

    let service = DashboardService::new(state.db.clone());
    let trend = service
        .trend(
            query.start,
            query.end,
            query.tz_offset.as_deref(),
            query.metric.unwrap_or_default(),
        )
        .await
        .map_err(map_dashboard_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(trend)))
}

/// GET /v1/dashboard/inspectors
pub async fn get_inspector_performance(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer])?;
    let query = query.into_inner();

    let service = DashboardService::new(state.db.clone());
    let rows = service
        .inspector_performance(query.start, query.end)
        .await
        .map_err(map_dashboard_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(rows)))
}

/// Map dashboard errors to application errors
fn map_dashboard_error(e: DashboardError) -> AppError {
    match e {
        DashboardError::InvalidRange(msg) => AppError::Validation(msg),
        DashboardError::InvalidOffset(msg) => {
            AppError::Validation(format!("invalid tz offset: {msg}"))
        }
        DashboardError::Database(e) => AppError::Database(e),
    }
}

/// Configure dashboard routes
pub fn configure_dashboard_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard/stats").route(web::get().to(get_stats)));
    cfg.service(web::resource("/dashboard/trend").route(web::get().to(get_trend)));
    cfg.service(
        web::resource("/dashboard/inspectors").route(web::get().to(get_inspector_performance)),
    );
}
