//! Inspection model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of an inspection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inspection_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    /// Submitted by an inspector, awaiting review
    NeedReview,
    /// Reviewed and approved; report is downloadable
    Approved,
    /// Archive requested; NFT mint in flight
    Archiving,
    /// Minted on chain and frozen
    Archived,
    /// Hidden from customers and the public API
    Deactivated,
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NeedReview => "NEED_REVIEW",
            Self::Approved => "APPROVED",
            Self::Archiving => "ARCHIVING",
            Self::Archived => "ARCHIVED",
            Self::Deactivated => "DEACTIVATED",
        };
        write!(f, "{s}")
    }
}

/// Inspection entity
///
/// The five JSON sections mirror the report form filled in by inspectors in
/// the field app; the backend treats them as opaque documents apart from
/// change-log diffing.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub inspection_id: Uuid,
    pub inspection_code: String,
    pub plate_number: String,
    pub vehicle_brand: String,
    pub vehicle_model: String,
    pub vehicle_year: Option<i32>,
    pub odometer_km: Option<i32>,
    pub branch_code: String,
    pub overall_rating: Option<String>,
    pub inspection_date: DateTime<Utc>,
    pub status: InspectionStatus,
    pub inspector_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    pub identity_details: Option<serde_json::Value>,
    pub vehicle_data: Option<serde_json::Value>,
    pub equipment_checklist: Option<serde_json::Value>,
    pub inspection_summary: Option<serde_json::Value>,
    pub detail_assessment: Option<serde_json::Value>,
    pub nft_asset_id: Option<String>,
    pub nft_tx_id: Option<String>,
    pub report_file_key: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating an inspection
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInspectionRequest {
    pub plate_number: String,
    pub vehicle_brand: String,
    pub vehicle_model: String,
    #[serde(default)]
    pub vehicle_year: Option<i32>,
    #[serde(default)]
    pub odometer_km: Option<i32>,
    #[serde(default)]
    pub overall_rating: Option<String>,
    pub inspection_date: DateTime<Utc>,
    #[serde(default)]
    pub identity_details: Option<serde_json::Value>,
    #[serde(default)]
    pub vehicle_data: Option<serde_json::Value>,
    #[serde(default)]
    pub equipment_checklist: Option<serde_json::Value>,
    #[serde(default)]
    pub inspection_summary: Option<serde_json::Value>,
    #[serde(default)]
    pub detail_assessment: Option<serde_json::Value>,
}

/// Request payload for updating an inspection during review.
///
/// Absent fields are left untouched; present fields are diffed against the
/// stored row and every real change lands in the change log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInspectionRequest {
    pub plate_number: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<i32>,
    pub odometer_km: Option<i32>,
    pub overall_rating: Option<String>,
    pub identity_details: Option<serde_json::Value>,
    pub vehicle_data: Option<serde_json::Value>,
    pub equipment_checklist: Option<serde_json::Value>,
    pub inspection_summary: Option<serde_json::Value>,
    pub detail_assessment: Option<serde_json::Value>,
}

/// Query parameters for the inspection listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInspectionsQuery {
    pub status: Option<InspectionStatus>,
    /// Matches plate number or inspection code, case-insensitive
    pub keyword: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// A single recorded field change on an inspection
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InspectionChangeLog {
    pub log_id: Uuid,
    pub inspection_id: Uuid,
    pub changed_by: Uuid,
    pub field_name: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changed_at: DateTime<Utc>,
}

/// Redacted inspection view served by the public API.
///
/// Customer identity and the raw report sections never leave the staff
/// surface; the public preview carries just enough to identify the vehicle
/// and the verdict.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicInspection {
    pub inspection_code: String,
    pub plate_number: String,
    pub vehicle_brand: String,
    pub vehicle_model: String,
    pub vehicle_year: Option<i32>,
    pub overall_rating: Option<String>,
    pub inspection_date: DateTime<Utc>,
    pub status: InspectionStatus,
    pub branch_code: String,
    pub nft_asset_id: Option<String>,
}

/// Query parameters for public inspection search
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSearchQuery {
    pub plate: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// Public listing entry for an active inspector
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicInspector {
    pub full_name: String,
    pub branch_code: Option<String>,
}
