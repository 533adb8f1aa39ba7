use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardano_inspect::handlers::{
    configure_auth_routes, configure_credit_routes, configure_dashboard_routes,
    configure_health_routes, configure_inspection_routes, configure_photo_routes,
    configure_public_routes, configure_purchase_routes, configure_user_routes,
};
use cardano_inspect::services::{
    AuthService, BlockfrostClient, BlockfrostConfig, GatewayMinter, GoogleVerifier, HealthService,
    MintWorker, MintWorkerConfig, MintingConfig, PaymentGatewayClient, TokenService,
};
use cardano_inspect::services::payment_gateway::PaymentConfig;
use cardano_inspect::services::photo_storage::{B2Client, B2Config, PhotoStorageBackend};
use cardano_inspect::{AppState, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardano_inspect=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Connect to the database and apply pending migrations
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Object storage
    let b2_config = B2Config::from_env().expect("Failed to load B2 configuration");
    let storage: Arc<dyn PhotoStorageBackend> =
        Arc::new(B2Client::new(b2_config).expect("Failed to initialize B2 client"));

    // Payment gateway
    let payment_config = PaymentConfig::from_env().expect("Failed to load payment configuration");
    let payments = PaymentGatewayClient::new(payment_config);

    // Auth
    let tokens = TokenService::new(
        config.jwt_secret.clone(),
        config.access_token_ttl_minutes,
        config.refresh_token_ttl_days,
    );
    let google = config.google_client_id.clone().map(GoogleVerifier::new);
    let auth = AuthService::new(pool.clone(), tokens.clone(), google);

    // Health checks with a short result cache
    let health = HealthService::new(
        pool.clone(),
        storage.clone(),
        Duration::from_secs(config.health_cache_ttl_secs),
    );

    // Mint worker
    let minting_config = MintingConfig::from_env().expect("Failed to load minting configuration");
    let minter = Arc::new(GatewayMinter::new(
        minting_config.gateway_url.clone(),
        minting_config.gateway_token.clone(),
    ));
    let chain = Arc::new(BlockfrostClient::new(
        BlockfrostConfig::from_env().expect("Failed to load Blockfrost configuration"),
    ));
    let _mint_shutdown = MintWorker::new(
        pool.clone(),
        minter,
        chain,
        minting_config,
        MintWorkerConfig::from_env(),
    )
    .start();

    let state = web::Data::new(AppState {
        db: pool,
        config: config.clone(),
        tokens,
        auth,
        storage,
        payments,
        health,
    });

    info!(
        host = %config.host,
        port = config.port,
        "Starting inspection platform backend"
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/v1")
                    .configure(configure_health_routes)
                    .configure(configure_auth_routes)
                    .configure(configure_user_routes)
                    .configure(configure_photo_routes)
                    .configure(configure_credit_routes)
                    .configure(configure_inspection_routes)
                    .configure(configure_purchase_routes)
                    .configure(configure_dashboard_routes)
                    .configure(configure_public_routes),
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
