//! Purchase handlers
//!
//! Checkout, the payment gateway webhook, and purchase history.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{CheckoutRequest, InvoiceCallback, Role};
use crate::services::purchase::{CallbackOutcome, PurchaseError};
use crate::services::PurchaseService;
use crate::AppState;

use super::auth::AuthUser;
use super::ApiResponse;

/// Header carrying the gateway's shared callback token
const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Query parameters for the purchase listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPurchasesQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// POST /v1/purchases/checkout
///
/// Start a credit purchase and return the hosted checkout URL.
pub async fn checkout(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Customer])?;

    let service = PurchaseService::new(state.db.clone(), state.payments.clone());
    let response = service
        .checkout(user.user_id, &user.email, body.into_inner().package_id)
        .await
        .map_err(map_purchase_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(response)))
}

/// POST /v1/purchases/webhook
///
/// Invoice callback from the payment gateway, authenticated by the shared
/// callback token header. Replays are acknowledged with 200 so the gateway
/// stops resending.
pub async fn webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<InvoiceCallback>,
) -> Result<HttpResponse, AppError> {
    let presented = req
        .headers()
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.payments.verify_callback_token(presented) {
        return Err(AppError::Unauthorized(
            "invalid callback token".to_string(),
        ));
    }

    let service = PurchaseService::new(state.db.clone(), state.payments.clone());
    let outcome = service
        .handle_callback(body.into_inner())
        .await
        .map_err(map_purchase_error)?;

    let status = match outcome {
        CallbackOutcome::Settled => "settled",
        CallbackOutcome::Expired => "expired",
        CallbackOutcome::AlreadyProcessed => "already_processed",
    };
    Ok(HttpResponse::Ok().json(ApiResponse::new(serde_json::json!({ "status": status }))))
}

/// GET /v1/purchases
///
/// Customers see their own purchases; admins see everything.
pub async fn list_purchases(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ListPurchasesQuery>,
) -> Result<HttpResponse, AppError> {
    let scope = match user.role {
        Role::Admin => None,
        _ => Some(user.user_id),
    };
    let query = query.into_inner();

    let service = PurchaseService::new(state.db.clone(), state.payments.clone());
    let page = service
        .list(scope, query.page, query.page_size)
        .await
        .map_err(map_purchase_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/// Map purchase errors to application errors
fn map_purchase_error(e: PurchaseError) -> AppError {
    match e {
        PurchaseError::PackageNotFound(id) => {
            AppError::NotFound(format!("credit package not found: {id}"))
        }
        PurchaseError::PackageInactive => {
            AppError::Conflict("credit package is not for sale".to_string())
        }
        PurchaseError::NotFound(id) => AppError::NotFound(format!("purchase not found: {id}")),
        PurchaseError::CallbackRejected(msg) => AppError::Validation(msg),
        PurchaseError::Gateway(e) => AppError::Upstream(e.to_string()),
        PurchaseError::Database(e) => AppError::Database(e),
    }
}

/// Configure purchase routes
pub fn configure_purchase_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/purchases/checkout").route(web::post().to(checkout)));
    cfg.service(web::resource("/purchases/webhook").route(web::post().to(webhook)));
    cfg.service(web::resource("/purchases").route(web::get().to(list_purchases)));
}
