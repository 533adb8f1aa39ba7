//! Payment Gateway Client
//!
//! Thin client for the hosted-invoice payment gateway used at checkout.
//! Invoice creation is deliberately not retried: the gateway call is not
//! idempotent and a duplicate invoice would double-bill the customer.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Default gateway API base URL
const DEFAULT_BASE_URL: &str = "https://api.xendit.co";

/// Default invoice validity in seconds (24 hours)
const DEFAULT_INVOICE_DURATION_SECS: u64 = 86_400;

/// Errors from the payment gateway client
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment gateway transport error: {0}")]
    Transport(String),

    #[error("Payment gateway rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Payment gateway returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Payment gateway configuration error: {0}")]
    Config(String),
}

/// Gateway configuration loaded from environment variables
///
/// # Environment Variables
///
/// - `PAYMENT_API_KEY`: secret API key (required)
/// - `PAYMENT_CALLBACK_TOKEN`: shared secret expected on webhook callbacks (required)
/// - `PAYMENT_API_BASE_URL`: API base override (optional)
/// - `PAYMENT_INVOICE_DURATION_SECS`: invoice validity (optional, default 86400)
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_key: String,
    pub callback_token: String,
    pub base_url: String,
    pub invoice_duration_secs: u64,
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, PaymentError> {
        let api_key = env::var("PAYMENT_API_KEY")
            .map_err(|_| PaymentError::Config("PAYMENT_API_KEY is not set".to_string()))?;
        let callback_token = env::var("PAYMENT_CALLBACK_TOKEN")
            .map_err(|_| PaymentError::Config("PAYMENT_CALLBACK_TOKEN is not set".to_string()))?;
        let base_url =
            env::var("PAYMENT_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let invoice_duration_secs = match env::var("PAYMENT_INVOICE_DURATION_SECS") {
            Ok(v) => v.parse().map_err(|_| {
                PaymentError::Config("PAYMENT_INVOICE_DURATION_SECS is not a number".to_string())
            })?,
            Err(_) => DEFAULT_INVOICE_DURATION_SECS,
        };

        Ok(Self {
            api_key,
            callback_token,
            base_url,
            invoice_duration_secs,
        })
    }
}

/// Request body for invoice creation
#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceRequest {
    pub external_id: String,
    pub amount: i64,
    pub payer_email: String,
    pub description: String,
    pub invoice_duration: u64,
}

/// Invoice as returned by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub external_id: String,
    pub status: String,
    pub invoice_url: String,
    pub amount: i64,
}

/// Hosted-invoice payment gateway client
#[derive(Clone)]
pub struct PaymentGatewayClient {
    http: reqwest::Client,
    config: PaymentConfig,
}

impl PaymentGatewayClient {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a hosted invoice for a purchase.
    ///
    /// `external_id` is our purchase id; the gateway echoes it back on the
    /// webhook so callbacks can be matched to purchases.
    pub async fn create_invoice(
        &self,
        external_id: &str,
        amount: i64,
        payer_email: &str,
        description: &str,
    ) -> Result<Invoice, PaymentError> {
        let request = CreateInvoiceRequest {
            external_id: external_id.to_string(),
            amount,
            payer_email: payer_email.to_string(),
            description: description.to_string(),
            invoice_duration: self.config.invoice_duration_secs,
        };

        debug!(external_id = %external_id, amount = amount, "Creating gateway invoice");

        let response = self
            .http
            .post(format!("{}/v2/invoices", self.config.base_url))
            .basic_auth(&self.config.api_key, Some(""))
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let invoice = Self::parse_invoice(response).await?;
        info!(
            external_id = %external_id,
            invoice_id = %invoice.id,
            "Gateway invoice created"
        );
        Ok(invoice)
    }

    /// Fetch an invoice by gateway id
    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v2/invoices/{}", self.config.base_url, invoice_id))
            .basic_auth(&self.config.api_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Self::parse_invoice(response).await
    }

    /// Expire a pending invoice so it can no longer be paid
    pub async fn expire_invoice(&self, invoice_id: &str) -> Result<Invoice, PaymentError> {
        let response = self
            .http
            .post(format!(
                "{}/invoices/{}/expire!",
                self.config.base_url, invoice_id
            ))
            .basic_auth(&self.config.api_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Self::parse_invoice(response).await
    }

    /// Check the shared callback token presented on a webhook request
    pub fn verify_callback_token(&self, presented: &str) -> bool {
        // Use constant-time comparison to prevent timing attacks
        constant_time_eq(presented, &self.config.callback_token)
    }

    async fn parse_invoice(response: reqwest::Response) -> Result<Invoice, PaymentError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> PaymentGatewayClient {
        PaymentGatewayClient::new(PaymentConfig {
            api_key: "sk-test".to_string(),
            callback_token: "callback-secret".to_string(),
            base_url: base_url.to_string(),
            invoice_duration_secs: 3600,
        })
    }

    #[test]
    fn test_callback_token_verification() {
        let client = test_client(DEFAULT_BASE_URL);
        assert!(client.verify_callback_token("callback-secret"));
        assert!(!client.verify_callback_token("wrong"));
        assert!(!client.verify_callback_token(""));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("hello", "hell"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }
}
