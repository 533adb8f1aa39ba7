//! NFT Minting Service
//!
//! Turns archived inspections into on-chain Cardano NFTs. The service owns
//! the mint-request state machine (queued -> submitted -> confirmed, or
//! failed after the attempt cap); transaction construction and signing live
//! behind the `NftMinter` seam, since the wallet key never enters this
//! process. Confirmation reads the chain through `ChainIndex`.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Inspection, InspectionStatus, MintRequest};
use crate::services::blockfrost::{ChainError, ChainIndex};

/// Default cap on mint submission attempts before a request is failed
const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Cardano asset names are limited to 32 bytes
const MAX_ASSET_NAME_BYTES: usize = 32;

/// Errors from the minting pipeline
#[derive(Debug, Error)]
pub enum MintingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Mint submission failed: {0}")]
    Submission(String),

    #[error("Chain index error: {0}")]
    Chain(#[from] ChainError),

    #[error("Minting configuration error: {0}")]
    Config(String),

    #[error("Inspection {0} is not in a mintable state")]
    NotMintable(Uuid),
}

/// Minting configuration loaded from environment variables
///
/// # Environment Variables
///
/// - `CARDANO_POLICY_ID`: minting policy id for inspection NFTs (required)
/// - `MINT_GATEWAY_URL`: signing gateway endpoint (required)
/// - `MINT_GATEWAY_TOKEN`: bearer token for the signing gateway (optional)
/// - `MINT_MAX_ATTEMPTS`: submission attempt cap (optional, default 5)
#[derive(Debug, Clone)]
pub struct MintingConfig {
    pub policy_id: String,
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub max_attempts: i32,
}

impl MintingConfig {
    pub fn from_env() -> Result<Self, MintingError> {
        let policy_id = env::var("CARDANO_POLICY_ID")
            .map_err(|_| MintingError::Config("CARDANO_POLICY_ID is not set".to_string()))?;
        let gateway_url = env::var("MINT_GATEWAY_URL")
            .map_err(|_| MintingError::Config("MINT_GATEWAY_URL is not set".to_string()))?;
        let gateway_token = env::var("MINT_GATEWAY_TOKEN").ok().filter(|s| !s.is_empty());
        let max_attempts = match env::var("MINT_MAX_ATTEMPTS") {
            Ok(v) => v
                .parse()
                .map_err(|_| MintingError::Config("MINT_MAX_ATTEMPTS is not a number".to_string()))?,
            Err(_) => DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            policy_id,
            gateway_url,
            gateway_token,
            max_attempts,
        })
    }
}

/// Submits mint transactions for inspection metadata.
///
/// The production implementation posts to the platform's signing gateway,
/// which holds the minting wallet and returns the submitted transaction id.
#[async_trait]
pub trait NftMinter: Send + Sync {
    async fn submit_mint(
        &self,
        asset_name: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, MintingError>;
}

#[derive(Debug, Deserialize)]
struct GatewayMintResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

/// Signing-gateway-backed minter
pub struct GatewayMinter {
    http: reqwest::Client,
    gateway_url: String,
    gateway_token: Option<String>,
}

impl GatewayMinter {
    pub fn new(gateway_url: String, gateway_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            gateway_url,
            gateway_token,
        }
    }
}

#[async_trait]
impl NftMinter for GatewayMinter {
    async fn submit_mint(
        &self,
        asset_name: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, MintingError> {
        let mut request = self.http.post(&self.gateway_url).json(&serde_json::json!({
            "assetName": asset_name,
            "metadata": metadata,
        }));
        if let Some(token) = &self.gateway_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MintingError::Submission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(MintingError::Submission(format!(
                "signing gateway returned {status}: {message}"
            )));
        }

        let body: GatewayMintResponse = response
            .json()
            .await
            .map_err(|e| MintingError::Submission(e.to_string()))?;
        Ok(body.tx_id)
    }
}

/// Derive the on-chain asset name from an inspection code.
///
/// Inspection codes are short ASCII and fit the 32-byte limit; anything
/// longer is truncated at a character boundary.
pub fn asset_name_for(inspection_code: &str) -> String {
    let mut name: String = inspection_code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    while name.len() > MAX_ASSET_NAME_BYTES {
        name.pop();
    }
    name
}

/// Full asset id as the chain index knows it: policy id + hex asset name
pub fn asset_id_for(policy_id: &str, asset_name: &str) -> String {
    format!("{}{}", policy_id, hex::encode(asset_name.as_bytes()))
}

/// Build the CIP-25 metadata document for an inspection NFT
pub fn build_metadata(inspection: &Inspection, policy_id: &str) -> serde_json::Value {
    let asset_name = asset_name_for(&inspection.inspection_code);

    serde_json::json!({
        "721": {
            policy_id: {
                asset_name: {
                    "name": format!("CAR-dano Inspection {}", inspection.inspection_code),
                    "description": "Vehicle inspection certificate",
                    "inspectionCode": inspection.inspection_code,
                    "plateNumber": inspection.plate_number,
                    "vehicle": format!("{} {}", inspection.vehicle_brand, inspection.vehicle_model),
                    "vehicleYear": inspection.vehicle_year,
                    "odometerKm": inspection.odometer_km,
                    "overallRating": inspection.overall_rating,
                    "inspectionDate": inspection.inspection_date.to_rfc3339(),
                    "branch": inspection.branch_code,
                }
            }
        }
    })
}

/// Drives mint requests through their state machine
pub struct MintingService {
    pool: PgPool,
    minter: Arc<dyn NftMinter>,
    chain: Arc<dyn ChainIndex>,
    config: MintingConfig,
}

impl MintingService {
    pub fn new(
        pool: PgPool,
        minter: Arc<dyn NftMinter>,
        chain: Arc<dyn ChainIndex>,
        config: MintingConfig,
    ) -> Self {
        Self {
            pool,
            minter,
            chain,
            config,
        }
    }

    /// Submit queued mint requests. Returns the number submitted.
    pub async fn process_queued(&self) -> Result<u32, MintingError> {
        let requests = sqlx::query_as::<_, MintRequest>(
            r#"
            SELECT mint_id, inspection_id, status, attempts, last_error, tx_id, asset_id,
                   created_at, updated_at
            FROM mint_requests
            WHERE status = 'queued' AND attempts < $1
            ORDER BY created_at
            LIMIT 20
            "#,
        )
        .bind(self.config.max_attempts)
        .fetch_all(&self.pool)
        .await?;

        let mut submitted = 0;
        for request in requests {
            match self.submit_one(&request).await {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!(
                        mint_id = %request.mint_id,
                        inspection_id = %request.inspection_id,
                        error = %e,
                        "Mint submission failed"
                    );
                    self.record_failure(&request, &e).await?;
                }
            }
        }

        Ok(submitted)
    }

    /// Confirm submitted mint requests against the chain index.
    /// Returns the number confirmed.
    pub async fn confirm_submitted(&self) -> Result<u32, MintingError> {
        let requests = sqlx::query_as::<_, MintRequest>(
            r#"
            SELECT mint_id, inspection_id, status, attempts, last_error, tx_id, asset_id,
                   created_at, updated_at
            FROM mint_requests
            WHERE status = 'submitted'
            ORDER BY created_at
            LIMIT 50
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut confirmed = 0;
        for request in requests {
            let Some(asset_id) = request.asset_id.clone() else {
                continue;
            };

            match self.chain.asset(&asset_id).await {
                Ok(Some(info)) => {
                    self.mark_confirmed(&request, &info.initial_mint_tx_hash)
                        .await?;
                    confirmed += 1;
                }
                Ok(None) => {
                    debug!(asset_id = %asset_id, "Asset not yet visible on chain");
                }
                Err(e) => {
                    // Transient index failures are retried on the next cycle
                    warn!(asset_id = %asset_id, error = %e, "Chain lookup failed");
                }
            }
        }

        Ok(confirmed)
    }

    async fn submit_one(&self, request: &MintRequest) -> Result<(), MintingError> {
        let inspection = sqlx::query_as::<_, Inspection>(
            r#"
            SELECT inspection_id, inspection_code, plate_number, vehicle_brand, vehicle_model,
                   vehicle_year, odometer_km, branch_code, overall_rating, inspection_date,
                   status, inspector_id, reviewer_id, identity_details, vehicle_data,
                   equipment_checklist, inspection_summary, detail_assessment,
                   nft_asset_id, nft_tx_id, report_file_key, approved_at, created_at, updated_at
            FROM inspections
            WHERE inspection_id = $1
            "#,
        )
        .bind(request.inspection_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MintingError::NotMintable(request.inspection_id))?;

        if inspection.status != InspectionStatus::Archiving {
            return Err(MintingError::NotMintable(request.inspection_id));
        }

        let asset_name = asset_name_for(&inspection.inspection_code);
        let asset_id = asset_id_for(&self.config.policy_id, &asset_name);
        let metadata = build_metadata(&inspection, &self.config.policy_id);

        let tx_id = self.minter.submit_mint(&asset_name, &metadata).await?;

        sqlx::query(
            r#"
            UPDATE mint_requests
            SET status = 'submitted', tx_id = $2, asset_id = $3,
                attempts = attempts + 1, last_error = NULL, updated_at = NOW()
            WHERE mint_id = $1
            "#,
        )
        .bind(request.mint_id)
        .bind(&tx_id)
        .bind(&asset_id)
        .execute(&self.pool)
        .await?;

        info!(
            mint_id = %request.mint_id,
            inspection_code = %inspection.inspection_code,
            tx_id = %tx_id,
            "Mint transaction submitted"
        );

        Ok(())
    }

    /// Record a failed submission attempt; after the cap the request is
    /// failed and the inspection returns to Approved so staff can retry the
    /// archive later.
    async fn record_failure(
        &self,
        request: &MintRequest,
        err: &MintingError,
    ) -> Result<(), MintingError> {
        let attempts = request.attempts + 1;
        let exhausted = attempts >= self.config.max_attempts;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE mint_requests
            SET status = CASE WHEN $3 THEN 'failed'::mint_status ELSE status END,
                attempts = $2, last_error = $4, updated_at = NOW()
            WHERE mint_id = $1
            "#,
        )
        .bind(request.mint_id)
        .bind(attempts)
        .bind(exhausted)
        .bind(err.to_string())
        .execute(&mut *tx)
        .await?;

        if exhausted {
            sqlx::query(
                r#"
                UPDATE inspections
                SET status = 'approved', updated_at = NOW()
                WHERE inspection_id = $1 AND status = 'archiving'
                "#,
            )
            .bind(request.inspection_id)
            .execute(&mut *tx)
            .await?;

            error!(
                mint_id = %request.mint_id,
                inspection_id = %request.inspection_id,
                attempts = attempts,
                "Mint request failed permanently, inspection returned to approved"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_confirmed(
        &self,
        request: &MintRequest,
        mint_tx_hash: &str,
    ) -> Result<(), MintingError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE mint_requests
            SET status = 'confirmed', tx_id = COALESCE(tx_id, $2), updated_at = NOW()
            WHERE mint_id = $1
            "#,
        )
        .bind(request.mint_id)
        .bind(mint_tx_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE inspections
            SET status = 'archived', nft_asset_id = $2, nft_tx_id = $3, updated_at = NOW()
            WHERE inspection_id = $1 AND status = 'archiving'
            "#,
        )
        .bind(request.inspection_id)
        .bind(&request.asset_id)
        .bind(mint_tx_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            mint_id = %request.mint_id,
            inspection_id = %request.inspection_id,
            tx_id = %mint_tx_hash,
            "Mint confirmed, inspection archived"
        );

        Ok(())
    }
}
