//! HTTP tests for the payment gateway webhook

#[cfg(test)]
mod http_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{test, web, App};
    use serde_json::{json, Value};
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::handlers::configure_purchase_routes;
    use crate::models::Role;
    use crate::services::payment_gateway::PaymentConfig;
    use crate::services::photo_storage::{InMemoryPhotoStorage, PhotoStorageBackend};
    use crate::services::{AuthService, HealthService, PaymentGatewayClient, TokenService};
    use crate::AppState;

    async fn try_create_test_pool() -> Option<PgPool> {
        let _ = dotenvy::dotenv();
        let database_url = std::env::var("DATABASE_URL").ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .ok()
    }

    fn create_test_app_state(pool: PgPool) -> web::Data<AppState> {
        let config = Config {
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            database_max_connections: 5,
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: "test-secret-test-secret-test-secret-1234".to_string(),
            access_token_ttl_minutes: 120,
            refresh_token_ttl_days: 7,
            google_client_id: None,
            health_cache_ttl_secs: 15,
        };
        let tokens = TokenService::new(config.jwt_secret.clone(), 120, 7);
        let auth = AuthService::new(pool.clone(), tokens.clone(), None);
        let storage: Arc<dyn PhotoStorageBackend> = Arc::new(InMemoryPhotoStorage::new());
        let payments = PaymentGatewayClient::new(PaymentConfig {
            api_key: "sk-test".to_string(),
            callback_token: "test-callback-token".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            invoice_duration_secs: 3600,
        });
        let health = HealthService::new(pool.clone(), storage.clone(), Duration::from_secs(15));

        web::Data::new(AppState {
            db: pool,
            config,
            tokens,
            auth,
            storage,
            payments,
            health,
        })
    }

    /// Create a customer plus a pending purchase; returns (user, purchase)
    async fn create_pending_purchase(pool: &PgPool) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let suffix = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, full_name, role)
            VALUES ($1, $2, $3, 'Customer', 'customer')
            "#,
        )
        .bind(user_id)
        .bind(format!("cust-{suffix}"))
        .bind(format!("cust-{suffix}@example.com"))
        .execute(pool)
        .await
        .unwrap();

        let package_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO credit_packages (package_id, name, credit_amount, price_idr)
            VALUES ($1, $2, 5, 50000)
            "#,
        )
        .bind(package_id)
        .bind(format!("Paket {suffix}"))
        .execute(pool)
        .await
        .unwrap();

        let purchase_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO purchases (purchase_id, user_id, package_id, package_name,
                                   credit_amount, amount_idr, invoice_id)
            VALUES ($1, $2, $3, 'Paket', 5, 50000, $4)
            "#,
        )
        .bind(purchase_id)
        .bind(user_id)
        .bind(package_id)
        .bind(format!("inv-{suffix}"))
        .execute(pool)
        .await
        .unwrap();

        (user_id, purchase_id)
    }

    fn paid_callback(purchase_id: Uuid) -> Value {
        json!({
            "id": format!("inv-{}", purchase_id.simple()),
            "external_id": purchase_id.to_string(),
            "status": "PAID",
            "paid_amount": 50000,
            "payment_method": "BANK_TRANSFER"
        })
    }

    #[actix_web::test]
    async fn test_webhook_rejects_bad_token() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_purchase_routes),
        )
        .await;

        let (_, purchase_id) = create_pending_purchase(&pool).await;

        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .insert_header(("x-callback-token", "wrong-token"))
            .set_json(paid_callback(purchase_id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        // No token at all
        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .set_json(paid_callback(purchase_id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_webhook_settles_exactly_once() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_purchase_routes),
        )
        .await;

        let (user_id, purchase_id) = create_pending_purchase(&pool).await;

        // First PAID callback grants the credits
        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .insert_header(("x-callback-token", "test-callback-token"))
            .set_json(paid_callback(purchase_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "settled");

        let balance: i32 =
            sqlx::query_scalar("SELECT credit_balance FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 5);

        // The replay is acknowledged without crediting again
        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .insert_header(("x-callback-token", "test-callback-token"))
            .set_json(paid_callback(purchase_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "already_processed");

        let balance: i32 =
            sqlx::query_scalar("SELECT credit_balance FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 5);
    }

    #[actix_web::test]
    async fn test_webhook_expires_pending_purchase() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_purchase_routes),
        )
        .await;

        let (user_id, purchase_id) = create_pending_purchase(&pool).await;

        let mut callback = paid_callback(purchase_id);
        callback["status"] = json!("EXPIRED");

        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .insert_header(("x-callback-token", "test-callback-token"))
            .set_json(callback)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "expired");

        // Expiry never grants credits
        let balance: i32 =
            sqlx::query_scalar("SELECT credit_balance FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 0);
    }

    #[actix_web::test]
    async fn test_webhook_unknown_purchase_is_404() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_purchase_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/purchases/webhook")
            .insert_header(("x-callback-token", "test-callback-token"))
            .set_json(paid_callback(Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_purchase_listing_is_scoped_to_customer() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_purchase_routes),
        )
        .await;

        let (user_id, _) = create_pending_purchase(&pool).await;
        let (other_id, _) = create_pending_purchase(&pool).await;

        let token = state
            .tokens
            .issue_access_token(user_id, Role::Customer, "c@example.com")
            .unwrap();

        let req = test::TestRequest::get()
            .uri("/purchases")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body["data"]["total"], 1);
        for item in body["data"]["items"].as_array().unwrap() {
            assert_eq!(item["userId"], user_id.to_string());
            assert_ne!(item["userId"], other_id.to_string());
        }
    }
}
