//! Credit package and purchase models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Credit package entity
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub package_id: Uuid,
    pub name: String,
    pub credit_amount: i32,
    pub price_idr: i64,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a credit package
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCreditPackageRequest {
    pub name: String,
    pub credit_amount: i32,
    pub price_idr: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request payload for updating a credit package
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCreditPackageRequest {
    pub name: Option<String>,
    pub credit_amount: Option<i32>,
    pub price_idr: Option<i64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Settlement state of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

/// Purchase entity.
///
/// Package name, credit amount and price are snapshotted at checkout so a
/// later package edit cannot change what a customer bought.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub purchase_id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub package_name: String,
    pub credit_amount: i32,
    pub amount_idr: i64,
    pub status: PurchaseStatus,
    pub invoice_id: Option<String>,
    pub checkout_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for starting a checkout
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub package_id: Uuid,
}

/// Response payload for a started checkout
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub purchase_id: Uuid,
    pub invoice_id: String,
    pub checkout_url: String,
    pub amount_idr: i64,
}

/// Payment gateway invoice callback payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InvoiceCallback {
    /// Invoice id assigned by the gateway
    pub id: String,
    /// Our purchase id, echoed back by the gateway
    pub external_id: String,
    /// PAID or EXPIRED
    pub status: String,
    #[serde(default)]
    pub paid_amount: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Current credit balance of the calling customer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub credit_balance: i32,
}

/// Response payload for a report download
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDownloadResponse {
    pub inspection_code: String,
    pub url: String,
    /// False when this download was already paid for by an earlier request
    pub charged: bool,
    pub remaining_balance: i32,
}
