//! Integration tests for the payment gateway client against a mock API

use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardano_inspect::services::payment_gateway::{
    PaymentConfig, PaymentError, PaymentGatewayClient,
};

fn test_client(server: &MockServer) -> PaymentGatewayClient {
    PaymentGatewayClient::new(PaymentConfig {
        api_key: "sk-test".to_string(),
        callback_token: "callback-secret".to_string(),
        base_url: server.uri(),
        invoice_duration_secs: 3600,
    })
}

#[tokio::test]
async fn create_invoice_posts_the_purchase_details() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/invoices"))
        .and(header_exists("Authorization"))
        .and(body_partial_json(json!({
            "external_id": "purchase-1",
            "amount": 50000,
            "payer_email": "customer@example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "inv-1",
            "external_id": "purchase-1",
            "status": "PENDING",
            "invoice_url": "https://checkout.example/inv-1",
            "amount": 50000,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let invoice = client
        .create_invoice(
            "purchase-1",
            50000,
            "customer@example.com",
            "Hemat (5 report credits)",
        )
        .await
        .unwrap();

    assert_eq!(invoice.id, "inv-1");
    assert_eq!(invoice.invoice_url, "https://checkout.example/inv-1");
    assert_eq!(invoice.status, "PENDING");
}

#[tokio::test]
async fn create_invoice_does_not_retry_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/invoices"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"message":"DUPLICATE_ERROR"}"#),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .create_invoice("purchase-2", 10000, "c@example.com", "Paket")
        .await;

    match result {
        Err(PaymentError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("DUPLICATE_ERROR"));
        }
        other => panic!("expected an API error, got {other:?}"),
    }

    // Invoice creation is not idempotent at the gateway, so exactly one
    // request must have been made
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_invoice_fetches_by_gateway_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/invoices/inv-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "inv-7",
            "external_id": "purchase-7",
            "status": "PAID",
            "invoice_url": "https://checkout.example/inv-7",
            "amount": 75000,
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let invoice = client.get_invoice("inv-7").await.unwrap();
    assert_eq!(invoice.status, "PAID");
    assert_eq!(invoice.amount, 75000);
}

#[tokio::test]
async fn callback_token_is_checked_exactly() {
    let server = MockServer::start().await;
    let client = test_client(&server);

    assert!(client.verify_callback_token("callback-secret"));
    assert!(!client.verify_callback_token("callback-secret "));
    assert!(!client.verify_callback_token("CALLBACK-SECRET"));
}
