pub mod auth;
pub mod credits;
pub mod dashboard;
pub mod health;
pub mod inspections;
pub mod photos;
pub mod public;
pub mod purchases;
pub mod users;



#[cfg(test)]
mod credits_http_tests;

#[cfg(test)]
mod purchases_http_tests;


use serde::Serialize;

pub use auth::{configure_auth_routes, AuthUser};
pub use credits::configure_credit_routes;
pub use dashboard::configure_dashboard_routes;
pub use health::configure_health_routes;
pub use inspections::configure_inspection_routes;
pub use photos::configure_photo_routes;
pub use public::configure_public_routes;
pub use purchases::configure_purchase_routes;
pub use users::configure_user_routes;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    data: T,
    meta: ResponseMeta,
}

#[derive(Serialize)]
struct ResponseMeta {
    request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}
