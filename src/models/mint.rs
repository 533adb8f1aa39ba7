//! NFT mint request model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Progress of an inspection's on-chain mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "mint_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MintStatus {
    /// Waiting for the mint worker to pick it up
    Queued,
    /// Transaction submitted, awaiting chain confirmation
    Submitted,
    /// Asset visible on chain; inspection archived
    Confirmed,
    /// Gave up after the attempt cap
    Failed,
}

/// Mint request entity, one per archived inspection
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub mint_id: Uuid,
    pub inspection_id: Uuid,
    pub status: MintStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub tx_id: Option<String>,
    pub asset_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
