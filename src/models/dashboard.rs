//! Dashboard statistics and trend types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metric series selectable on the trend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    /// Inspections submitted by inspectors
    InspectionsCreated,
    /// Inspections approved by reviewers
    InspectionsApproved,
    /// Purchases settled by the payment gateway
    PurchasesPaid,
    /// Report downloads charged to customers
    ReportsDownloaded,
}

impl Default for TrendMetric {
    fn default() -> Self {
        Self::InspectionsCreated
    }
}

/// Bucket granularity, chosen from the requested range length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendGranularity {
    Hour,
    Day,
    Month,
}

impl TrendGranularity {
    /// SQL `date_trunc` unit for this granularity
    pub fn trunc_unit(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Key format used to match generated buckets against aggregated rows
    pub fn key_format(&self) -> &'static str {
        match self {
            Self::Hour => "%Y-%m-%d %H:00",
            Self::Day => "%Y-%m-%d",
            Self::Month => "%Y-%m",
        }
    }
}

/// Query parameters for the trend endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// UTC offset of the dashboard viewer, e.g. "+07:00"; defaults to UTC
    #[serde(default)]
    pub tz_offset: Option<String>,
    #[serde(default)]
    pub metric: Option<TrendMetric>,
}

/// One point of a trend series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    /// Bucket start formatted in the requested offset
    pub period: String,
    pub count: i64,
}

/// Trend endpoint response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResponse {
    pub metric: TrendMetric,
    pub granularity: TrendGranularity,
    pub buckets: Vec<TrendBucket>,
}

/// Query parameters for the stats and inspector endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Aggregate dashboard counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub inspections_total: i64,
    pub inspections_need_review: i64,
    pub inspections_approved: i64,
    pub inspections_archived: i64,
    pub inspections_deactivated: i64,
    pub users_total: i64,
    pub customers_total: i64,
    pub inspectors_total: i64,
    pub credits_sold: i64,
    pub credits_spent: i64,
    pub revenue_idr: i64,
}

/// Per-inspector volume over a range
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InspectorPerformance {
    pub inspector_id: uuid::Uuid,
    pub full_name: String,
    pub branch_code: Option<String>,
    pub inspections_total: i64,
    pub inspections_approved: i64,
}
