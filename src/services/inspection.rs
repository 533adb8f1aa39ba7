//! Inspection Service
//!
//! Owns the inspection lifecycle: creation by inspectors, review edits with
//! field-level change logging, approval, archive (which queues the NFT
//! mint), and the redacted public views.

use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    CreateInspectionRequest, Inspection, InspectionChangeLog, InspectionStatus,
    ListInspectionsQuery, Paginated, PublicInspection, PublicInspector, UpdateInspectionRequest,
};

/// Default page size for listings
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size for listings
const MAX_PAGE_SIZE: i64 = 100;

const SELECT_COLUMNS: &str = r#"
    inspection_id, inspection_code, plate_number, vehicle_brand, vehicle_model,
    vehicle_year, odometer_km, branch_code, overall_rating, inspection_date,
    status, inspector_id, reviewer_id, identity_details, vehicle_data,
    equipment_checklist, inspection_summary, detail_assessment,
    nft_asset_id, nft_tx_id, report_file_key, approved_at, created_at, updated_at
"#;

/// Errors that can occur during inspection operations
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("Inspection not found: {0}")]
    NotFound(Uuid),

    #[error("Inspection not found: {0}")]
    CodeNotFound(String),

    #[error("Inspection is {actual}, expected {expected}")]
    WrongStatus {
        expected: InspectionStatus,
        actual: InspectionStatus,
    },

    #[error("Invalid inspection data: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for inspection records
#[derive(Debug, Clone)]
pub struct InspectionService {
    pool: PgPool,
}

impl InspectionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an inspection in `NeedReview` for the calling inspector.
    ///
    /// The inspection code is `{BRANCH}-{YYYYMMDD}-{SEQ}`, with the sequence
    /// drawn from a per-branch daily counter so concurrent inspectors never
    /// collide.
    pub async fn create(
        &self,
        inspector_id: Uuid,
        branch_code: &str,
        request: CreateInspectionRequest,
    ) -> Result<Inspection, InspectionError> {
        if request.plate_number.trim().is_empty() {
            return Err(InspectionError::Validation(
                "plate number cannot be empty".to_string(),
            ));
        }
        if request.vehicle_brand.trim().is_empty() || request.vehicle_model.trim().is_empty() {
            return Err(InspectionError::Validation(
                "vehicle brand and model cannot be empty".to_string(),
            ));
        }
        let branch = branch_code.trim().to_uppercase();
        if branch.is_empty() {
            return Err(InspectionError::Validation(
                "inspector has no branch assigned".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let today = Utc::now().date_naive();
        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO inspection_code_counters (branch_code, day, last_seq)
            VALUES ($1, $2, 1)
            ON CONFLICT (branch_code, day)
            DO UPDATE SET last_seq = inspection_code_counters.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(&branch)
        .bind(today)
        .fetch_one(&mut *tx)
        .await?;

        let code = format!("{}-{}-{:04}", branch, today.format("%Y%m%d"), seq);

        let inspection = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            INSERT INTO inspections (inspection_id, inspection_code, plate_number,
                                     vehicle_brand, vehicle_model, vehicle_year, odometer_km,
                                     branch_code, overall_rating, inspection_date, inspector_id,
                                     identity_details, vehicle_data, equipment_checklist,
                                     inspection_summary, detail_assessment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(request.plate_number.trim())
        .bind(request.vehicle_brand.trim())
        .bind(request.vehicle_model.trim())
        .bind(request.vehicle_year)
        .bind(request.odometer_km)
        .bind(&branch)
        .bind(&request.overall_rating)
        .bind(request.inspection_date)
        .bind(inspector_id)
        .bind(&request.identity_details)
        .bind(&request.vehicle_data)
        .bind(&request.equipment_checklist)
        .bind(&request.inspection_summary)
        .bind(&request.detail_assessment)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            inspection_code = %inspection.inspection_code,
            inspector_id = %inspector_id,
            "Inspection created"
        );
        Ok(inspection)
    }

    /// List inspections for staff, with status filter and keyword search
    pub async fn list(
        &self,
        query: ListInspectionsQuery,
    ) -> Result<Paginated<Inspection>, InspectionError> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;
        let keyword = query
            .keyword
            .as_deref()
            .map(|k| format!("%{}%", k.trim()));

        let items = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM inspections
            WHERE ($1::inspection_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR plate_number ILIKE $2 OR inspection_code ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(query.status)
        .bind(&keyword)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM inspections
            WHERE ($1::inspection_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR plate_number ILIKE $2 OR inspection_code ILIKE $2)
            "#,
        )
        .bind(query.status)
        .bind(&keyword)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paginated {
            items,
            page,
            page_size,
            total,
        })
    }

    /// Get an inspection by id
    pub async fn get(&self, inspection_id: Uuid) -> Result<Inspection, InspectionError> {
        sqlx::query_as::<_, Inspection>(&format!(
            "SELECT {SELECT_COLUMNS} FROM inspections WHERE inspection_id = $1"
        ))
        .bind(inspection_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InspectionError::NotFound(inspection_id))
    }

    /// Apply review edits, recording every changed field in the change log.
    ///
    /// Only inspections still under review or approved can be edited;
    /// archived records are frozen by the mint.
    pub async fn update(
        &self,
        inspection_id: Uuid,
        editor_id: Uuid,
        request: UpdateInspectionRequest,
    ) -> Result<Inspection, InspectionError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Inspection>(&format!(
            "SELECT {SELECT_COLUMNS} FROM inspections WHERE inspection_id = $1 FOR UPDATE"
        ))
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(InspectionError::NotFound(inspection_id))?;

        if !matches!(
            current.status,
            InspectionStatus::NeedReview | InspectionStatus::Approved
        ) {
            return Err(InspectionError::WrongStatus {
                expected: InspectionStatus::NeedReview,
                actual: current.status,
            });
        }

        let changes = diff_fields(&current, &request);
        if changes.is_empty() {
            tx.commit().await?;
            return Ok(current);
        }

        let updated = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            UPDATE inspections
            SET plate_number = COALESCE($2, plate_number),
                vehicle_brand = COALESCE($3, vehicle_brand),
                vehicle_model = COALESCE($4, vehicle_model),
                vehicle_year = COALESCE($5, vehicle_year),
                odometer_km = COALESCE($6, odometer_km),
                overall_rating = COALESCE($7, overall_rating),
                identity_details = COALESCE($8, identity_details),
                vehicle_data = COALESCE($9, vehicle_data),
                equipment_checklist = COALESCE($10, equipment_checklist),
                inspection_summary = COALESCE($11, inspection_summary),
                detail_assessment = COALESCE($12, detail_assessment),
                reviewer_id = $13,
                updated_at = NOW()
            WHERE inspection_id = $1
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(inspection_id)
        .bind(&request.plate_number)
        .bind(&request.vehicle_brand)
        .bind(&request.vehicle_model)
        .bind(request.vehicle_year)
        .bind(request.odometer_km)
        .bind(&request.overall_rating)
        .bind(&request.identity_details)
        .bind(&request.vehicle_data)
        .bind(&request.equipment_checklist)
        .bind(&request.inspection_summary)
        .bind(&request.detail_assessment)
        .bind(editor_id)
        .fetch_one(&mut *tx)
        .await?;

        for change in &changes {
            sqlx::query(
                r#"
                INSERT INTO inspection_change_logs
                    (log_id, inspection_id, changed_by, field_name, old_value, new_value)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(inspection_id)
            .bind(editor_id)
            .bind(&change.field_name)
            .bind(&change.old_value)
            .bind(&change.new_value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            inspection_id = %inspection_id,
            editor_id = %editor_id,
            changed_fields = changes.len(),
            "Inspection updated"
        );
        Ok(updated)
    }

    /// List the change log for an inspection, newest first
    pub async fn change_log(
        &self,
        inspection_id: Uuid,
    ) -> Result<Vec<InspectionChangeLog>, InspectionError> {
        // Existence check so an unknown id is 404 instead of an empty list
        self.get(inspection_id).await?;

        let logs = sqlx::query_as::<_, InspectionChangeLog>(
            r#"
            SELECT log_id, inspection_id, changed_by, field_name, old_value, new_value, changed_at
            FROM inspection_change_logs
            WHERE inspection_id = $1
            ORDER BY changed_at DESC
            "#,
        )
        .bind(inspection_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Approve a reviewed inspection: `NeedReview -> Approved`
    pub async fn approve(
        &self,
        inspection_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<Inspection, InspectionError> {
        let updated = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            UPDATE inspections
            SET status = 'approved', reviewer_id = $2, approved_at = NOW(), updated_at = NOW()
            WHERE inspection_id = $1 AND status = 'need_review'
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(inspection_id)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(inspection) => {
                info!(
                    inspection_code = %inspection.inspection_code,
                    reviewer_id = %reviewer_id,
                    "Inspection approved"
                );
                Ok(inspection)
            }
            None => self.wrong_status_or_missing(inspection_id, InspectionStatus::NeedReview).await,
        }
    }

    /// Request archival: `Approved -> Archiving` plus a queued mint request.
    /// The mint worker finishes the transition to `Archived`.
    pub async fn archive(&self, inspection_id: Uuid) -> Result<Inspection, InspectionError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            UPDATE inspections
            SET status = 'archiving', updated_at = NOW()
            WHERE inspection_id = $1 AND status = 'approved'
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(inspection) = updated else {
            tx.commit().await?;
            return self
                .wrong_status_or_missing(inspection_id, InspectionStatus::Approved)
                .await;
        };

        // A re-archive after a failed mint reuses the existing request row
        sqlx::query(
            r#"
            INSERT INTO mint_requests (mint_id, inspection_id)
            VALUES ($1, $2)
            ON CONFLICT (inspection_id)
            DO UPDATE SET status = 'queued', attempts = 0, last_error = NULL, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(inspection_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            inspection_code = %inspection.inspection_code,
            "Inspection archive requested, mint queued"
        );
        Ok(inspection)
    }

    /// Hide an inspection from customers and the public API
    pub async fn deactivate(&self, inspection_id: Uuid) -> Result<Inspection, InspectionError> {
        let updated = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            UPDATE inspections
            SET status = 'deactivated', updated_at = NOW()
            WHERE inspection_id = $1 AND status IN ('need_review', 'approved', 'archived')
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(inspection_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(inspection) => Ok(inspection),
            None => self.wrong_status_or_missing(inspection_id, InspectionStatus::Approved).await,
        }
    }

    /// Reactivate a deactivated inspection back to `Approved`
    pub async fn reactivate(&self, inspection_id: Uuid) -> Result<Inspection, InspectionError> {
        let updated = sqlx::query_as::<_, Inspection>(&format!(
            r#"
            UPDATE inspections
            SET status = 'approved', updated_at = NOW()
            WHERE inspection_id = $1 AND status = 'deactivated'
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(inspection_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(inspection) => Ok(inspection),
            None => self.wrong_status_or_missing(inspection_id, InspectionStatus::Deactivated).await,
        }
    }

    /// Public search by plate number; only approved and archived records
    /// are visible
    pub async fn search_public(
        &self,
        plate: Option<&str>,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Paginated<PublicInspection>, InspectionError> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;
        let pattern = plate.map(|p| format!("%{}%", p.trim()));

        let items = sqlx::query_as::<_, PublicInspection>(
            r#"
            SELECT inspection_code, plate_number, vehicle_brand, vehicle_model, vehicle_year,
                   overall_rating, inspection_date, status, branch_code, nft_asset_id
            FROM inspections
            WHERE status IN ('approved', 'archived')
              AND ($1::text IS NULL OR plate_number ILIKE $1)
            ORDER BY inspection_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM inspections
            WHERE status IN ('approved', 'archived')
              AND ($1::text IS NULL OR plate_number ILIKE $1)
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paginated {
            items,
            page,
            page_size,
            total,
        })
    }

    /// Public preview by inspection code
    pub async fn get_public_by_code(
        &self,
        code: &str,
    ) -> Result<PublicInspection, InspectionError> {
        sqlx::query_as::<_, PublicInspection>(
            r#"
            SELECT inspection_code, plate_number, vehicle_brand, vehicle_model, vehicle_year,
                   overall_rating, inspection_date, status, branch_code, nft_asset_id
            FROM inspections
            WHERE inspection_code = $1 AND status IN ('approved', 'archived')
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| InspectionError::CodeNotFound(code.to_string()))
    }

    /// Public listing of active inspectors
    pub async fn list_public_inspectors(&self) -> Result<Vec<PublicInspector>, InspectionError> {
        let inspectors = sqlx::query_as::<_, PublicInspector>(
            r#"
            SELECT full_name, branch_code
            FROM users
            WHERE role = 'inspector' AND is_active
            ORDER BY full_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(inspectors)
    }

    /// Distinguish "missing row" from "wrong state" for a failed
    /// conditional transition
    async fn wrong_status_or_missing(
        &self,
        inspection_id: Uuid,
        expected: InspectionStatus,
    ) -> Result<Inspection, InspectionError> {
        let row = sqlx::query("SELECT status FROM inspections WHERE inspection_id = $1")
            .bind(inspection_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Err(InspectionError::WrongStatus {
                expected,
                actual: row.get::<InspectionStatus, _>("status"),
            }),
            None => Err(InspectionError::NotFound(inspection_id)),
        }
    }
}

/// A single pending field change
struct FieldChange {
    field_name: String,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
}

/// Diff the requested edits against the stored row.
///
/// A field only counts as changed when it is present in the request and its
/// value actually differs.
fn diff_fields(current: &Inspection, request: &UpdateInspectionRequest) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    let mut push = |field: &str, old: serde_json::Value, new: serde_json::Value| {
        if old != new {
            changes.push(FieldChange {
                field_name: field.to_string(),
                old_value: Some(old),
                new_value: Some(new),
            });
        }
    };

    if let Some(v) = &request.plate_number {
        push("plate_number", json!(current.plate_number), json!(v));
    }
    if let Some(v) = &request.vehicle_brand {
        push("vehicle_brand", json!(current.vehicle_brand), json!(v));
    }
    if let Some(v) = &request.vehicle_model {
        push("vehicle_model", json!(current.vehicle_model), json!(v));
    }
    if let Some(v) = request.vehicle_year {
        push("vehicle_year", json!(current.vehicle_year), json!(v));
    }
    if let Some(v) = request.odometer_km {
        push("odometer_km", json!(current.odometer_km), json!(v));
    }
    if let Some(v) = &request.overall_rating {
        push("overall_rating", json!(current.overall_rating), json!(v));
    }
    if let Some(v) = &request.identity_details {
        push(
            "identity_details",
            current.identity_details.clone().unwrap_or(json!(null)),
            v.clone(),
        );
    }
    if let Some(v) = &request.vehicle_data {
        push(
            "vehicle_data",
            current.vehicle_data.clone().unwrap_or(json!(null)),
            v.clone(),
        );
    }
    if let Some(v) = &request.equipment_checklist {
        push(
            "equipment_checklist",
            current.equipment_checklist.clone().unwrap_or(json!(null)),
            v.clone(),
        );
    }
    if let Some(v) = &request.inspection_summary {
        push(
            "inspection_summary",
            current.inspection_summary.clone().unwrap_or(json!(null)),
            v.clone(),
        );
    }
    if let Some(v) = &request.detail_assessment {
        push(
            "detail_assessment",
            current.detail_assessment.clone().unwrap_or(json!(null)),
            v.clone(),
        );
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Inspection {
        Inspection {
            inspection_id: Uuid::new_v4(),
            inspection_code: "YOG-20250801-0001".to_string(),
            plate_number: "AB 1234 CD".to_string(),
            vehicle_brand: "Toyota".to_string(),
            vehicle_model: "Avanza".to_string(),
            vehicle_year: Some(2021),
            odometer_km: Some(45200),
            branch_code: "YOG".to_string(),
            overall_rating: Some("8.5".to_string()),
            inspection_date: Utc::now(),
            status: InspectionStatus::NeedReview,
            inspector_id: Uuid::new_v4(),
            reviewer_id: None,
            identity_details: None,
            vehicle_data: Some(json!({"transmission": "manual"})),
            equipment_checklist: None,
            inspection_summary: None,
            detail_assessment: None,
            nft_asset_id: None,
            nft_tx_id: None,
            report_file_key: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_diff_ignores_absent_fields() {
        let current = sample();
        let request = UpdateInspectionRequest::default();
        assert!(diff_fields(&current, &request).is_empty());
    }

    #[test]
    fn test_diff_ignores_equal_values() {
        let current = sample();
        let request = UpdateInspectionRequest {
            plate_number: Some("AB 1234 CD".to_string()),
            vehicle_year: Some(2021),
            ..Default::default()
        };
        assert!(diff_fields(&current, &request).is_empty());
    }

    #[test]
    fn test_diff_records_changed_scalars_and_sections() {
        let current = sample();
        let request = UpdateInspectionRequest {
            odometer_km: Some(46000),
            vehicle_data: Some(json!({"transmission": "automatic"})),
            ..Default::default()
        };

        let changes = diff_fields(&current, &request);
        assert_eq!(changes.len(), 2);

        let odo = changes
            .iter()
            .find(|c| c.field_name == "odometer_km")
            .unwrap();
        assert_eq!(odo.old_value, Some(json!(45200)));
        assert_eq!(odo.new_value, Some(json!(46000)));

        let data = changes
            .iter()
            .find(|c| c.field_name == "vehicle_data")
            .unwrap();
        assert_eq!(data.old_value, Some(json!({"transmission": "manual"})));
        assert_eq!(data.new_value, Some(json!({"transmission": "automatic"})));
    }
}
