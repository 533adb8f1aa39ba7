//! Health handler

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::services::HealthStatus;
use crate::AppState;

/// GET /v1/health
///
/// Cached system health; 503 when a critical component is down so load
/// balancers can act on the status code alone.
pub async fn get_health(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let health = state.health.check_health().await;

    let response = match health.status {
        HealthStatus::Unhealthy => HttpResponse::ServiceUnavailable().json(health),
        _ => HttpResponse::Ok().json(health),
    };
    Ok(response)
}

/// Configure health routes
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(get_health)));
}
