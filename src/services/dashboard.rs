//! Dashboard Service
//!
//! Aggregate counters and time-bucketed trend series. Trend buckets are
//! generated in the viewer's UTC offset, the counts come from one GROUP BY
//! over the shifted timestamps, and the two are merged by formatted bucket
//! key so gaps in the data stay visible as zeros.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::models::{
    DashboardStats, InspectorPerformance, TrendBucket, TrendGranularity, TrendMetric,
    TrendResponse,
};

/// Ranges up to this many hours bucket hourly
const HOURLY_RANGE_MAX_HOURS: i64 = 48;

/// Ranges up to this many days bucket daily; longer ranges bucket monthly
const DAILY_RANGE_MAX_DAYS: i64 = 92;

/// Hard cap on generated buckets for one request
const MAX_BUCKETS: usize = 1000;

/// Errors that can occur during dashboard queries
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid timezone offset: {0}")]
    InvalidOffset(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for dashboard statistics
#[derive(Debug, Clone)]
pub struct DashboardService {
    pool: PgPool,
}

impl DashboardService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate platform counters, optionally restricted to a date range
    pub async fn stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<DashboardStats, DashboardError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(DashboardError::InvalidRange(
                    "start must be before end".to_string(),
                ));
            }
        }

        let inspection_row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'need_review') AS need_review,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status IN ('archiving', 'archived')) AS archived,
                COUNT(*) FILTER (WHERE status = 'deactivated') AS deactivated
            FROM inspections
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let user_row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE role = 'customer') AS customers,
                COUNT(*) FILTER (WHERE role = 'inspector') AS inspectors
            FROM users
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let billing_row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(credit_amount) FILTER (WHERE status = 'paid'), 0)::BIGINT AS credits_sold,
                COALESCE(SUM(amount_idr) FILTER (WHERE status = 'paid'), 0)::BIGINT AS revenue_idr
            FROM purchases
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let credits_spent = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM report_downloads
            WHERE ($1::timestamptz IS NULL OR downloaded_at >= $1)
              AND ($2::timestamptz IS NULL OR downloaded_at < $2)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            inspections_total: inspection_row.get("total"),
            inspections_need_review: inspection_row.get("need_review"),
            inspections_approved: inspection_row.get("approved"),
            inspections_archived: inspection_row.get("archived"),
            inspections_deactivated: inspection_row.get("deactivated"),
            users_total: user_row.get("total"),
            customers_total: user_row.get("customers"),
            inspectors_total: user_row.get("inspectors"),
            credits_sold: billing_row.get("credits_sold"),
            credits_spent,
            revenue_idr: billing_row.get("revenue_idr"),
        })
    }

    /// Time-bucketed trend series for one metric
    pub async fn trend(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tz_offset: Option<&str>,
        metric: TrendMetric,
    ) -> Result<TrendResponse, DashboardError> {
        if start >= end {
            return Err(DashboardError::InvalidRange(
                "start must be before end".to_string(),
            ));
        }

        let offset = parse_tz_offset(tz_offset.unwrap_or("+00:00"))?;
        let granularity = granularity_for(start, end);
        let buckets = generate_buckets(start, end, offset, granularity)?;

        let (table, ts_column, extra_filter) = match metric {
            TrendMetric::InspectionsCreated => ("inspections", "created_at", ""),
            TrendMetric::InspectionsApproved => {
                ("inspections", "approved_at", "AND approved_at IS NOT NULL")
            }
            TrendMetric::PurchasesPaid => ("purchases", "paid_at", "AND paid_at IS NOT NULL"),
            TrendMetric::ReportsDownloaded => ("report_downloads", "downloaded_at", ""),
        };

        // Shift into the viewer's offset before truncating so bucket edges
        // fall on their local midnights, not UTC's
        let query = format!(
            r#"
            SELECT date_trunc($1, ({ts_column} AT TIME ZONE 'UTC') + $2::interval) AS bucket,
                   COUNT(*) AS count
            FROM {table}
            WHERE {ts_column} >= $3 AND {ts_column} < $4 {extra_filter}
            GROUP BY bucket
            "#
        );

        let offset_interval = format!("{} minutes", offset.local_minus_utc() / 60);
        let rows = sqlx::query(&query)
            .bind(granularity.trunc_unit())
            .bind(&offset_interval)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        let mut counts: HashMap<String, i64> = HashMap::with_capacity(rows.len());
        for row in rows {
            let bucket: NaiveDateTime = row.get("bucket");
            let count: i64 = row.get("count");
            counts.insert(bucket.format(granularity.key_format()).to_string(), count);
        }

        let buckets = buckets
            .into_iter()
            .map(|period| {
                let count = counts.get(&period).copied().unwrap_or(0);
                TrendBucket { period, count }
            })
            .collect();

        Ok(TrendResponse {
            metric,
            granularity,
            buckets,
        })
    }

    /// Per-inspector volume over a range
    pub async fn inspector_performance(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<InspectorPerformance>, DashboardError> {
        let rows = sqlx::query_as::<_, InspectorPerformance>(
            r#"
            SELECT u.user_id AS inspector_id,
                   u.full_name,
                   u.branch_code,
                   COUNT(i.inspection_id) AS inspections_total,
                   COUNT(i.inspection_id) FILTER (WHERE i.approved_at IS NOT NULL)
                       AS inspections_approved
            FROM users u
            LEFT JOIN inspections i
                ON i.inspector_id = u.user_id
               AND ($1::timestamptz IS NULL OR i.created_at >= $1)
               AND ($2::timestamptz IS NULL OR i.created_at < $2)
            WHERE u.role = 'inspector'
            GROUP BY u.user_id, u.full_name, u.branch_code
            ORDER BY inspections_total DESC, u.full_name
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Parse a UTC offset of the form "+07:00" / "-03:30" / "Z"
pub fn parse_tz_offset(raw: &str) -> Result<FixedOffset, DashboardError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "Z" || raw == "z" {
        return Ok(FixedOffset::east_opt(0).expect("zero offset"));
    }

    let bad = || DashboardError::InvalidOffset(raw.to_string());

    let sign = match raw.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err(bad()),
    };
    let rest = &raw[1..];

    let (hours, minutes) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = hours.parse().map_err(|_| bad())?;
    let minutes: i32 = minutes.parse().map_err(|_| bad())?;
    if hours > 14 || minutes > 59 {
        return Err(bad());
    }

    let seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(seconds).ok_or_else(bad)
}

/// Choose the bucket granularity from the range length
pub fn granularity_for(start: DateTime<Utc>, end: DateTime<Utc>) -> TrendGranularity {
    let span = end - start;
    if span <= Duration::hours(HOURLY_RANGE_MAX_HOURS) {
        TrendGranularity::Hour
    } else if span <= Duration::days(DAILY_RANGE_MAX_DAYS) {
        TrendGranularity::Day
    } else {
        TrendGranularity::Month
    }
}

/// Generate the formatted keys of every bucket between start and end in the
/// given offset, start-inclusive
pub fn generate_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    offset: FixedOffset,
    granularity: TrendGranularity,
) -> Result<Vec<String>, DashboardError> {
    let local_start = start.with_timezone(&offset).naive_local();
    let local_end = end.with_timezone(&offset).naive_local();

    let mut cursor = truncate(local_start, granularity);
    let mut buckets = Vec::new();

    while cursor < local_end {
        buckets.push(cursor.format(granularity.key_format()).to_string());
        if buckets.len() > MAX_BUCKETS {
            return Err(DashboardError::InvalidRange(format!(
                "range produces more than {MAX_BUCKETS} buckets"
            )));
        }
        cursor = step(cursor, granularity);
    }

    Ok(buckets)
}

/// Floor a local timestamp to its bucket start
fn truncate(ts: NaiveDateTime, granularity: TrendGranularity) -> NaiveDateTime {
    match granularity {
        TrendGranularity::Hour => ts
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .expect("in-range time components"),
        TrendGranularity::Day => ts.date().and_hms_opt(0, 0, 0).expect("midnight"),
        TrendGranularity::Month => NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
            .expect("first of month")
            .and_hms_opt(0, 0, 0)
            .expect("midnight"),
    }
}

/// Advance a bucket start to the next bucket
fn step(ts: NaiveDateTime, granularity: TrendGranularity) -> NaiveDateTime {
    match granularity {
        TrendGranularity::Hour => ts + Duration::hours(1),
        TrendGranularity::Day => ts + Duration::days(1),
        TrendGranularity::Month => {
            let (year, month) = if ts.month() == 12 {
                (ts.year() + 1, 1)
            } else {
                (ts.year(), ts.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
                .expect("first of month")
                .and_hms_opt(0, 0, 0)
                .expect("midnight")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_tz_offset() {
        assert_eq!(
            parse_tz_offset("+07:00").unwrap().local_minus_utc(),
            7 * 3600
        );
        assert_eq!(
            parse_tz_offset("-03:30").unwrap().local_minus_utc(),
            -(3 * 3600 + 30 * 60)
        );
        assert_eq!(parse_tz_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_tz_offset("07:00").is_err());
        assert!(parse_tz_offset("+25:00").is_err());
        assert!(parse_tz_offset("+07").is_err());
    }

    #[test]
    fn test_granularity_thresholds() {
        let start = utc(2025, 8, 1, 0, 0);
        assert_eq!(
            granularity_for(start, utc(2025, 8, 2, 12, 0)),
            TrendGranularity::Hour
        );
        assert_eq!(
            granularity_for(start, utc(2025, 8, 10, 0, 0)),
            TrendGranularity::Day
        );
        assert_eq!(
            granularity_for(start, utc(2026, 2, 1, 0, 0)),
            TrendGranularity::Month
        );
    }

    #[test]
    fn test_generate_hourly_buckets() {
        let offset = parse_tz_offset("+00:00").unwrap();
        let buckets = generate_buckets(
            utc(2025, 8, 1, 10, 30),
            utc(2025, 8, 1, 13, 0),
            offset,
            TrendGranularity::Hour,
        )
        .unwrap();
        assert_eq!(
            buckets,
            vec![
                "2025-08-01 10:00",
                "2025-08-01 11:00",
                "2025-08-01 12:00",
            ]
        );
    }

    #[test]
    fn test_generate_daily_buckets_honors_offset() {
        // 2025-08-01T20:00Z is already 2025-08-02 in UTC+7, so the first
        // bucket must be the local 2nd
        let offset = parse_tz_offset("+07:00").unwrap();
        let buckets = generate_buckets(
            utc(2025, 8, 1, 20, 0),
            utc(2025, 8, 3, 20, 0),
            offset,
            TrendGranularity::Day,
        )
        .unwrap();
        assert_eq!(buckets, vec!["2025-08-02", "2025-08-03", "2025-08-04"]);
    }

    #[test]
    fn test_generate_monthly_buckets_cross_year() {
        let offset = parse_tz_offset("Z").unwrap();
        let buckets = generate_buckets(
            utc(2024, 11, 15, 0, 0),
            utc(2025, 2, 1, 0, 0),
            offset,
            TrendGranularity::Month,
        )
        .unwrap();
        assert_eq!(buckets, vec!["2024-11", "2024-12", "2025-01"]);
    }

    #[test]
    fn test_generate_buckets_caps_runaway_ranges() {
        let offset = parse_tz_offset("Z").unwrap();
        let result = generate_buckets(
            utc(1900, 1, 1, 0, 0),
            utc(2025, 1, 1, 0, 0),
            offset,
            TrendGranularity::Month,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_truncate_month() {
        let ts = NaiveDate::from_ymd_opt(2025, 8, 17)
            .unwrap()
            .and_hms_opt(13, 45, 12)
            .unwrap();
        let truncated = truncate(ts, TrendGranularity::Month);
        assert_eq!(truncated.format("%Y-%m-%d %H:%M").to_string(), "2025-08-01 00:00");
    }
}
