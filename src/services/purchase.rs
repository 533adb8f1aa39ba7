//! Purchase Service
//!
//! Checkout against the payment gateway and settlement via its webhook.
//! Settlement is idempotent per purchase: the row is locked and only a
//! Pending purchase can move to Paid, so a replayed callback is
//! acknowledged without crediting twice.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    CheckoutResponse, InvoiceCallback, Paginated, Purchase, PurchaseStatus,
};
use crate::services::payment_gateway::{PaymentError, PaymentGatewayClient};

/// Default page size for listings
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size for listings
const MAX_PAGE_SIZE: i64 = 100;

/// Errors that can occur during purchase operations
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Credit package not found: {0}")]
    PackageNotFound(Uuid),

    #[error("Credit package is not for sale")]
    PackageInactive,

    #[error("Purchase not found: {0}")]
    NotFound(String),

    #[error("Callback rejected: {0}")]
    CallbackRejected(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] PaymentError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of processing a gateway callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Purchase settled and credits granted
    Settled,
    /// Purchase marked expired
    Expired,
    /// Callback replayed or out of order; acknowledged without changes
    AlreadyProcessed,
}

/// Service for credit purchases
#[derive(Clone)]
pub struct PurchaseService {
    pool: PgPool,
    gateway: PaymentGatewayClient,
}

impl PurchaseService {
    pub fn new(pool: PgPool, gateway: PaymentGatewayClient) -> Self {
        Self { pool, gateway }
    }

    /// Start a checkout: record a pending purchase, then ask the gateway
    /// for a hosted invoice.
    ///
    /// The purchase row is committed before the gateway call so a crash
    /// between the two leaves a traceable Pending record rather than a
    /// paid-but-unknown invoice.
    pub async fn checkout(
        &self,
        user_id: Uuid,
        user_email: &str,
        package_id: Uuid,
    ) -> Result<CheckoutResponse, PurchaseError> {
        let package = sqlx::query_as::<_, (String, i32, i64, bool)>(
            "SELECT name, credit_amount, price_idr, is_active FROM credit_packages WHERE package_id = $1",
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PurchaseError::PackageNotFound(package_id))?;

        let (package_name, credit_amount, price_idr, is_active) = package;
        if !is_active {
            return Err(PurchaseError::PackageInactive);
        }

        let purchase_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO purchases (purchase_id, user_id, package_id, package_name,
                                   credit_amount, amount_idr)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(purchase_id)
        .bind(user_id)
        .bind(package_id)
        .bind(&package_name)
        .bind(credit_amount)
        .bind(price_idr)
        .execute(&self.pool)
        .await?;

        let description = format!("{package_name} ({credit_amount} report credits)");
        let invoice = match self
            .gateway
            .create_invoice(&purchase_id.to_string(), price_idr, user_email, &description)
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(purchase_id = %purchase_id, error = %e, "Invoice creation failed");
                sqlx::query(
                    "UPDATE purchases SET status = 'failed', updated_at = NOW() WHERE purchase_id = $1",
                )
                .bind(purchase_id)
                .execute(&self.pool)
                .await?;
                return Err(PurchaseError::Gateway(e));
            }
        };

        sqlx::query(
            r#"
            UPDATE purchases
            SET invoice_id = $2, checkout_url = $3, updated_at = NOW()
            WHERE purchase_id = $1
            "#,
        )
        .bind(purchase_id)
        .bind(&invoice.id)
        .bind(&invoice.invoice_url)
        .execute(&self.pool)
        .await?;

        info!(
            purchase_id = %purchase_id,
            user_id = %user_id,
            invoice_id = %invoice.id,
            amount_idr = price_idr,
            "Checkout started"
        );

        Ok(CheckoutResponse {
            purchase_id,
            invoice_id: invoice.id,
            checkout_url: invoice.invoice_url,
            amount_idr: price_idr,
        })
    }

    /// Process an invoice callback from the payment gateway.
    ///
    /// The caller has already verified the callback token.
    pub async fn handle_callback(
        &self,
        callback: InvoiceCallback,
    ) -> Result<CallbackOutcome, PurchaseError> {
        let purchase_id = Uuid::parse_str(&callback.external_id).map_err(|_| {
            PurchaseError::CallbackRejected(format!(
                "external id {} is not a purchase id",
                callback.external_id
            ))
        })?;

        let mut tx = self.pool.begin().await?;

        let purchase = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT purchase_id, user_id, package_id, package_name, credit_amount, amount_idr,
                   status, invoice_id, checkout_url, paid_at, created_at, updated_at
            FROM purchases
            WHERE purchase_id = $1
            FOR UPDATE
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PurchaseError::NotFound(callback.external_id.clone()))?;

        // Settlement and expiry only apply to pending purchases; anything
        // else is a replay or an out-of-order event
        if purchase.status != PurchaseStatus::Pending {
            tx.commit().await?;
            info!(
                purchase_id = %purchase_id,
                status = ?purchase.status,
                event = %callback.status,
                "Callback replay ignored"
            );
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        match callback.status.as_str() {
            "PAID" => {
                sqlx::query(
                    r#"
                    UPDATE purchases
                    SET status = 'paid', invoice_id = COALESCE(invoice_id, $2),
                        paid_at = $3, updated_at = NOW()
                    WHERE purchase_id = $1
                    "#,
                )
                .bind(purchase_id)
                .bind(&callback.id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    UPDATE users
                    SET credit_balance = credit_balance + $2, updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(purchase.user_id)
                .bind(purchase.credit_amount)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;

                info!(
                    purchase_id = %purchase_id,
                    user_id = %purchase.user_id,
                    credits = purchase.credit_amount,
                    "Purchase settled, credits granted"
                );
                Ok(CallbackOutcome::Settled)
            }
            "EXPIRED" => {
                sqlx::query(
                    "UPDATE purchases SET status = 'expired', updated_at = NOW() WHERE purchase_id = $1",
                )
                .bind(purchase_id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                info!(purchase_id = %purchase_id, "Purchase expired");
                Ok(CallbackOutcome::Expired)
            }
            other => {
                tx.commit().await?;
                Err(PurchaseError::CallbackRejected(format!(
                    "unknown invoice status {other}"
                )))
            }
        }
    }

    /// List purchases, scoped to one customer unless `user_id` is `None`
    /// (admin view)
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Paginated<Purchase>, PurchaseError> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;

        let items = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT purchase_id, user_id, package_id, package_name, credit_amount, amount_idr,
                   status, invoice_id, checkout_url, paid_at, created_at, updated_at
            FROM purchases
            WHERE $1::uuid IS NULL OR user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM purchases WHERE $1::uuid IS NULL OR user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paginated {
            items,
            page,
            page_size,
            total,
        })
    }
}
