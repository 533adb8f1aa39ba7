//! HTTP tests for credit packages, balances, and report downloads

#[cfg(test)]
mod http_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{test, web, App};
    use serde_json::{json, Value};
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::handlers::configure_credit_routes;
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

    async fn create_user_with_token(
        state: &web::Data<AppState>,
        pool: &PgPool,
        role: Role,
        credit_balance: i32,
    ) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let suffix = Uuid::new_v4().simple().to_string();
        let email = format!("user-{suffix}@example.com");

        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, full_name, role, branch_code,
                               credit_balance)
            VALUES ($1, $2, $3, 'Test User', $4, 'YOG', $5)
            "#,
        )
        .bind(user_id)
        .bind(format!("user-{suffix}"))
        .bind(&email)
        .bind(role)
        .bind(credit_balance)
        .execute(pool)
        .await
        .expect("Failed to create test user");

        let token = state
            .tokens
            .issue_access_token(user_id, role, &email)
            .unwrap();
        (user_id, token)
    }

    /// Insert an approved inspection directly and return its id
    async fn create_approved_inspection(pool: &PgPool, inspector_id: Uuid) -> Uuid {
        let inspection_id = Uuid::new_v4();
        let code = format!("TST-{}", Uuid::new_v4().simple());

        sqlx::query(
            r#"
            INSERT INTO inspections (inspection_id, inspection_code, plate_number,
                                     vehicle_brand, vehicle_model, branch_code,
                                     inspection_date, status, inspector_id, approved_at)
            VALUES ($1, $2, 'AB 1 C', 'Toyota', 'Avanza', 'TST', NOW(), 'approved', $3, NOW())
            "#,
        )
        .bind(inspection_id)
        .bind(&code)
        .bind(inspector_id)
        .execute(pool)
        .await
        .expect("Failed to create inspection");

        inspection_id
    }

    #[actix_web::test]
    async fn test_package_crud_roundtrip() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_credit_routes),
        )
        .await;

        let (_, admin_token) = create_user_with_token(&state, &pool, Role::Admin, 0).await;
        let name = format!("Hemat {}", Uuid::new_v4().simple());

        // Create
        let req = test::TestRequest::post()
            .uri("/credit-packages")
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .set_json(json!({ "name": name, "creditAmount": 5, "priceIdr": 50000 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let body: Value = test::read_body_json(resp).await;
        let package_id = body["data"]["packageId"].as_str().unwrap().to_string();

        // Duplicate name is a conflict
        let req = test::TestRequest::post()
            .uri("/credit-packages")
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .set_json(json!({ "name": name, "creditAmount": 1, "priceIdr": 10000 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);

        // Update
        let req = test::TestRequest::put()
            .uri(&format!("/credit-packages/{package_id}"))
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .set_json(json!({ "priceIdr": 45000 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["priceIdr"], 45000);

        // Delete
        let req = test::TestRequest::delete()
            .uri(&format!("/credit-packages/{package_id}"))
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);

        // Gone now
        let req = test::TestRequest::get()
            .uri(&format!("/credit-packages/{package_id}"))
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_package_delete_refused_with_purchases() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_credit_routes),
        )
        .await;

        let (admin_id, admin_token) = create_user_with_token(&state, &pool, Role::Admin, 0).await;

        let package_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO credit_packages (package_id, name, credit_amount, price_idr)
            VALUES ($1, $2, 5, 50000)
            "#,
        )
        .bind(package_id)
        .bind(format!("Sold {}", Uuid::new_v4().simple()))
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            r#"
            INSERT INTO purchases (purchase_id, user_id, package_id, package_name,
                                   credit_amount, amount_idr, status)
            VALUES ($1, $2, $3, 'Sold', 5, 50000, 'paid')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(admin_id)
        .bind(package_id)
        .execute(&pool)
        .await
        .unwrap();

        let req = test::TestRequest::delete()
            .uri(&format!("/credit-packages/{package_id}"))
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);
    }

    #[actix_web::test]
    async fn test_report_download_charges_once_per_report() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_credit_routes),
        )
        .await;

        let (inspector_id, _) = create_user_with_token(&state, &pool, Role::Inspector, 0).await;
        let (_, customer_token) = create_user_with_token(&state, &pool, Role::Customer, 2).await;
        let first = create_approved_inspection(&pool, inspector_id).await;
        let second = create_approved_inspection(&pool, inspector_id).await;

        // First download of the first report: charged, balance 2 -> 1
        let req = test::TestRequest::post()
            .uri(&format!("/inspections/{first}/download"))
            .insert_header(("Authorization", format!("Bearer {customer_token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["charged"], true);
        assert_eq!(body["data"]["remainingBalance"], 1);

        // Re-download of the same report: free
        let req = test::TestRequest::post()
            .uri(&format!("/inspections/{first}/download"))
            .insert_header(("Authorization", format!("Bearer {customer_token}")))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["charged"], false);
        assert_eq!(body["data"]["remainingBalance"], 1);

        // A distinct report costs another credit: 1 -> 0
        let req = test::TestRequest::post()
            .uri(&format!("/inspections/{second}/download"))
            .insert_header(("Authorization", format!("Bearer {customer_token}")))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["charged"], true);
        assert_eq!(body["data"]["remainingBalance"], 0);

        // Empty balance on a third report: 402
        let third = create_approved_inspection(&pool, inspector_id).await;
        let req = test::TestRequest::post()
            .uri(&format!("/inspections/{third}/download"))
            .insert_header(("Authorization", format!("Bearer {customer_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 402);
    }

    #[actix_web::test]
    async fn test_report_download_requires_downloadable_status() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_credit_routes),
        )
        .await;

        let (inspector_id, _) = create_user_with_token(&state, &pool, Role::Inspector, 0).await;
        let (_, customer_token) = create_user_with_token(&state, &pool, Role::Customer, 1).await;

        // Still under review
        let inspection_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO inspections (inspection_id, inspection_code, plate_number,
                                     vehicle_brand, vehicle_model, branch_code,
                                     inspection_date, inspector_id)
            VALUES ($1, $2, 'AB 1 C', 'Toyota', 'Avanza', 'TST', NOW(), $3)
            "#,
        )
        .bind(inspection_id)
        .bind(format!("TST-{}", Uuid::new_v4().simple()))
        .bind(inspector_id)
        .execute(&pool)
        .await
        .unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/inspections/{inspection_id}/download"))
            .insert_header(("Authorization", format!("Bearer {customer_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);
    }

    #[actix_web::test]
    async fn test_balance_endpoint() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let state = create_test_app_state(pool.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_credit_routes),
        )
        .await;

        let (_, token) = create_user_with_token(&state, &pool, Role::Customer, 7).await;

        let req = test::TestRequest::get()
            .uri("/credits/balance")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["creditBalance"], 7);
    }
}
