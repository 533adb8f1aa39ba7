//! Blockfrost Client
//!
//! Read-only Cardano chain index access used to confirm minted inspection
//! NFTs. Authentication is a project id header; 404 on an asset lookup just
//! means the mint has not landed yet.

use std::env;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default Blockfrost API base (mainnet)
const DEFAULT_BASE_URL: &str = "https://cardano-mainnet.blockfrost.io/api/v0";

/// Errors from the chain index client
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Chain index transport error: {0}")]
    Transport(String),

    #[error("Chain index rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Chain index configuration error: {0}")]
    Config(String),
}

/// Blockfrost configuration loaded from environment variables
///
/// # Environment Variables
///
/// - `BLOCKFROST_PROJECT_ID`: API project id (required)
/// - `BLOCKFROST_BASE_URL`: API base override (optional)
#[derive(Debug, Clone)]
pub struct BlockfrostConfig {
    pub project_id: String,
    pub base_url: String,
}

impl BlockfrostConfig {
    pub fn from_env() -> Result<Self, ChainError> {
        let project_id = env::var("BLOCKFROST_PROJECT_ID")
            .map_err(|_| ChainError::Config("BLOCKFROST_PROJECT_ID is not set".to_string()))?;
        let base_url =
            env::var("BLOCKFROST_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            project_id,
            base_url,
        })
    }
}

/// On-chain asset details relevant to mint confirmation
#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub asset: String,
    pub policy_id: String,
    pub initial_mint_tx_hash: String,
}

/// Chain index lookups needed by the mint worker.
///
/// Production uses Blockfrost; tests substitute a fake.
#[async_trait]
pub trait ChainIndex: Send + Sync {
    /// Look up an asset by its id (policy id + hex asset name).
    ///
    /// Returns `None` while the asset is not yet visible on chain.
    async fn asset(&self, asset_id: &str) -> Result<Option<AssetInfo>, ChainError>;
}

/// Blockfrost-backed chain index client
pub struct BlockfrostClient {
    http: reqwest::Client,
    config: BlockfrostConfig,
}

impl BlockfrostClient {
    pub fn new(config: BlockfrostConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChainIndex for BlockfrostClient {
    async fn asset(&self, asset_id: &str) -> Result<Option<AssetInfo>, ChainError> {
        debug!(asset_id = %asset_id, "Looking up asset on chain index");

        let response = self
            .http
            .get(format!("{}/assets/{}", self.config.base_url, asset_id))
            .header("project_id", &self.config.project_id)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(ChainError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<AssetInfo>()
            .await
            .map(Some)
            .map_err(|e| ChainError::Transport(e.to_string()))
    }
}
