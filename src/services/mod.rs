pub mod auth;
pub mod blockfrost;
pub mod credit;
pub mod dashboard;
pub mod health;
pub mod inspection;
pub mod jobs;
pub mod minting;
pub mod payment_gateway;
pub mod photo;
pub mod photo_storage;
pub mod purchase;
pub mod token;
pub mod user;

#[cfg(test)]
mod minting_tests;

pub use auth::{AuthError, AuthService, GoogleVerifier, SessionTokens};
pub use blockfrost::{AssetInfo, BlockfrostClient, BlockfrostConfig, ChainError, ChainIndex};
pub use credit::{CreditError, CreditService};
pub use dashboard::{DashboardError, DashboardService};
pub use health::{DatabaseHealth, HealthService, HealthStatus, StorageHealth, SystemHealth};
pub use inspection::{InspectionError, InspectionService};
pub use jobs::{run_mint_cycle, MintWorker, MintWorkerConfig};
pub use minting::{
    asset_id_for, asset_name_for, build_metadata, GatewayMinter, MintingConfig, MintingError,
    MintingService, NftMinter,
};
pub use payment_gateway::{Invoice, PaymentConfig, PaymentError, PaymentGatewayClient};
pub use photo::{PhotoError, PhotoService};
pub use photo_storage::{
    B2Client, B2Config, InMemoryPhotoStorage, PhotoStorageBackend, RetryDecision, StorageError,
    StoredObject,
};
pub use purchase::{CallbackOutcome, PurchaseError, PurchaseService};
pub use token::{AccessTokenClaims, RefreshTokenClaims, TokenError, TokenService};
pub use user::{UserError, UserService};
