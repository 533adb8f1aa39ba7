//! CAR-dano - vehicle inspection platform backend
//!
//! This library provides the services and models behind the inspection
//! platform: staff and customer auth, inspection records with review
//! change logs, photo storage, report credits sold through a payment
//! gateway, dashboard statistics, and NFT archival on Cardano.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;

// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    CreditPackage, Inspection, InspectionChangeLog, InspectionStatus, MintRequest, MintStatus,
    Photo, PhotoCategory, Purchase, PurchaseStatus, Role, User,
};

pub use services::{
    AuthService, CreditService, DashboardService, HealthService, InspectionService, MintWorker,
    MintingService, PaymentGatewayClient, PhotoService, PurchaseService, TokenService, UserService,
};

// Storage exports for integration tests
pub use services::{
    B2Client, B2Config, InMemoryPhotoStorage, PhotoStorageBackend, RetryDecision, StorageError,
    StoredObject,
};

/// Application state shared across handlers
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub storage: Arc<dyn PhotoStorageBackend>,
    pub payments: PaymentGatewayClient,
    pub health: HealthService,
}
