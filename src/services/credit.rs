//! Credit Service
//!
//! Credit package management, customer balances, and the report download
//! charge. The charge is idempotent per (customer, report): the ledger row
//! in `report_downloads` is inserted in the same transaction that debits
//! the balance, so a repeat download can never be billed twice.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::{
    CreateCreditPackageRequest, CreditPackage, InspectionStatus, ReportDownloadResponse,
    UpdateCreditPackageRequest,
};
use crate::services::photo_storage::{PhotoStorageBackend, StorageError};

/// Errors that can occur during credit operations
#[derive(Debug, Error)]
pub enum CreditError {
    #[error("Credit package not found: {0}")]
    PackageNotFound(Uuid),

    #[error("Inspection not found: {0}")]
    InspectionNotFound(Uuid),

    #[error("Duplicate package name")]
    DuplicateName,

    #[error("Package has purchases and can only be deactivated")]
    PackageInUse,

    #[error("Report is not available for download (status {0})")]
    ReportUnavailable(InspectionStatus),

    #[error("Credit balance is empty")]
    InsufficientCredits,

    #[error("Invalid package data: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for credit packages and balances
#[derive(Clone)]
pub struct CreditService {
    pool: PgPool,
    storage: Arc<dyn PhotoStorageBackend>,
}

impl CreditService {
    pub fn new(pool: PgPool, storage: Arc<dyn PhotoStorageBackend>) -> Self {
        Self { pool, storage }
    }

    /// List credit packages. Staff see everything; the storefront passes
    /// `active_only` to hide retired packages.
    pub async fn list_packages(&self, active_only: bool) -> Result<Vec<CreditPackage>, CreditError> {
        let packages = sqlx::query_as::<_, CreditPackage>(
            r#"
            SELECT package_id, name, credit_amount, price_idr, description, is_active,
                   created_at, updated_at
            FROM credit_packages
            WHERE NOT $1 OR is_active
            ORDER BY price_idr
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(packages)
    }

    /// Get a credit package by id
    pub async fn get_package(&self, package_id: Uuid) -> Result<CreditPackage, CreditError> {
        sqlx::query_as::<_, CreditPackage>(
            r#"
            SELECT package_id, name, credit_amount, price_idr, description, is_active,
                   created_at, updated_at
            FROM credit_packages
            WHERE package_id = $1
            "#,
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CreditError::PackageNotFound(package_id))
    }

    /// Create a credit package
    pub async fn create_package(
        &self,
        request: CreateCreditPackageRequest,
    ) -> Result<CreditPackage, CreditError> {
        if request.name.trim().is_empty() {
            return Err(CreditError::Validation("name cannot be empty".to_string()));
        }
        if request.credit_amount <= 0 {
            return Err(CreditError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }
        if request.price_idr < 0 {
            return Err(CreditError::Validation(
                "price cannot be negative".to_string(),
            ));
        }

        let package = sqlx::query_as::<_, CreditPackage>(
            r#"
            INSERT INTO credit_packages (package_id, name, credit_amount, price_idr, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING package_id, name, credit_amount, price_idr, description, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(request.credit_amount)
        .bind(request.price_idr)
        .bind(&request.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CreditError::DuplicateName
            } else {
                CreditError::Database(e)
            }
        })?;

        info!(package_id = %package.package_id, name = %package.name, "Credit package created");
        Ok(package)
    }

    /// Update a credit package
    pub async fn update_package(
        &self,
        package_id: Uuid,
        request: UpdateCreditPackageRequest,
    ) -> Result<CreditPackage, CreditError> {
        if let Some(amount) = request.credit_amount {
            if amount <= 0 {
                return Err(CreditError::Validation(
                    "credit amount must be positive".to_string(),
                ));
            }
        }
        if let Some(price) = request.price_idr {
            if price < 0 {
                return Err(CreditError::Validation(
                    "price cannot be negative".to_string(),
                ));
            }
        }

        let package = sqlx::query_as::<_, CreditPackage>(
            r#"
            UPDATE credit_packages
            SET name = COALESCE($2, name),
                credit_amount = COALESCE($3, credit_amount),
                price_idr = COALESCE($4, price_idr),
                description = COALESCE($5, description),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE package_id = $1
            RETURNING package_id, name, credit_amount, price_idr, description, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(package_id)
        .bind(&request.name)
        .bind(request.credit_amount)
        .bind(request.price_idr)
        .bind(&request.description)
        .bind(request.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CreditError::DuplicateName
            } else {
                CreditError::Database(e)
            }
        })?
        .ok_or(CreditError::PackageNotFound(package_id))?;

        Ok(package)
    }

    /// Delete a credit package. Packages with purchase history are part of
    /// the billing record and can only be deactivated.
    pub async fn delete_package(&self, package_id: Uuid) -> Result<(), CreditError> {
        let purchases =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM purchases WHERE package_id = $1")
                .bind(package_id)
                .fetch_one(&self.pool)
                .await?;
        if purchases > 0 {
            return Err(CreditError::PackageInUse);
        }

        let result = sqlx::query("DELETE FROM credit_packages WHERE package_id = $1")
            .bind(package_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CreditError::PackageNotFound(package_id));
        }

        info!(package_id = %package_id, "Credit package deleted");
        Ok(())
    }

    /// Current credit balance of a customer
    pub async fn balance(&self, user_id: Uuid) -> Result<i32, CreditError> {
        let balance =
            sqlx::query_scalar::<_, i32>("SELECT credit_balance FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(balance)
    }

    /// Charge one credit for a report download, idempotently.
    ///
    /// The first download of a given report inserts the ledger row and
    /// debits the balance in one transaction; any later download of the
    /// same report short-circuits on the existing row and is free.
    pub async fn download_report(
        &self,
        user_id: Uuid,
        inspection_id: Uuid,
    ) -> Result<ReportDownloadResponse, CreditError> {
        let mut tx = self.pool.begin().await?;

        let inspection = sqlx::query_as::<_, (String, InspectionStatus, Option<String>)>(
            r#"
            SELECT inspection_code, status, report_file_key
            FROM inspections
            WHERE inspection_id = $1
            "#,
        )
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CreditError::InspectionNotFound(inspection_id))?;

        let (inspection_code, status, report_file_key) = inspection;
        if !matches!(status, InspectionStatus::Approved | InspectionStatus::Archived) {
            return Err(CreditError::ReportUnavailable(status));
        }

        let report_key =
            report_file_key.unwrap_or_else(|| format!("reports/{inspection_code}.pdf"));

        let already_downloaded = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM report_downloads WHERE user_id = $1 AND inspection_id = $2",
        )
        .bind(user_id)
        .bind(inspection_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_downloaded > 0 {
            tx.commit().await?;
            let url = self.storage.download_url(&report_key).await?;
            let balance = self.balance(user_id).await?;
            return Ok(ReportDownloadResponse {
                inspection_code,
                url,
                charged: false,
                remaining_balance: balance,
            });
        }

        // Lock the balance row for the debit
        let balance = sqlx::query_scalar::<_, i32>(
            "SELECT credit_balance FROM users WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if balance < 1 {
            return Err(CreditError::InsufficientCredits);
        }

        sqlx::query("INSERT INTO report_downloads (user_id, inspection_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(inspection_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE users SET credit_balance = credit_balance - 1, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            user_id = %user_id,
            inspection_code = %inspection_code,
            remaining = balance - 1,
            "Report download charged"
        );

        let url = self.storage.download_url(&report_key).await?;
        Ok(ReportDownloadResponse {
            inspection_code,
            url,
            charged: true,
            remaining_balance: balance - 1,
        })
    }
}
