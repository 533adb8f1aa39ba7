//! Integration tests for the B2 storage client against a mock API.
//!
//! These exercise the full authorize / get-upload-url / upload sequence,
//! the token cache, and the retry policy without touching the real
//! service.

use serde_json::json;
use wiremock::matchers::{body_json_string, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use cardano_inspect::services::photo_storage::{B2Client, B2Config, PhotoStorageBackend};
use cardano_inspect::StorageError;

fn test_config(server: &MockServer, max_retries: u32) -> B2Config {
    B2Config {
        key_id: "key-id".to_string(),
        application_key: "app-key".to_string(),
        bucket_id: "bucket-1".to_string(),
        bucket_name: "inspection-photos".to_string(),
        auth_base_url: server.uri(),
        max_retries,
        retry_max_backoff_secs: 1,
    }
}

async fn mount_authorize(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/b2api/v2/b2_authorize_account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorizationToken": "account-token",
            "apiUrl": server.uri(),
            "downloadUrl": format!("{}/dl", server.uri()),
        })))
        .mount(server)
        .await;
}

async fn mount_get_upload_url(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/b2api/v2/b2_get_upload_url"))
        .and(header("Authorization", "account-token"))
        .and(body_json_string(json!({ "bucketId": "bucket-1" }).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": format!("{}/upload-target", server.uri()),
            "authorizationToken": "upload-token",
        })))
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, path_suffix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r: &&Request| r.url.path().ends_with(path_suffix))
        .count()
}

#[tokio::test]
async fn upload_runs_the_three_step_sequence() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    mount_get_upload_url(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .and(header("Authorization", "upload-token"))
        .and(header("X-Bz-File-Name", "inspections/abc/photo.jpg"))
        .and(header("Content-Type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fileId": "file-123",
            "fileName": "inspections/abc/photo.jpg",
        })))
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    let stored = client
        .upload("inspections/abc/photo.jpg", "image/jpeg", b"jpeg-bytes")
        .await
        .unwrap();

    assert_eq!(stored.file_id, "file-123");
    assert_eq!(stored.size, 9);

    // The upload request must carry the hex SHA-1 of the content
    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/upload-target")
        .unwrap();
    let sha1 = upload.headers.get("X-Bz-Content-Sha1").unwrap();
    assert_eq!(sha1.to_str().unwrap().len(), 40);
}

#[tokio::test]
async fn upload_reuses_the_cached_authorization() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    mount_get_upload_url(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "fileId": "file-1" })),
        )
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    client.upload("a.jpg", "image/jpeg", b"a").await.unwrap();
    client.upload("b.jpg", "image/jpeg", b"b").await.unwrap();

    // One account authorization serves both uploads
    assert_eq!(count_requests(&server, "b2_authorize_account").await, 1);
    assert_eq!(count_requests(&server, "b2_get_upload_url").await, 2);
}

#[tokio::test]
async fn upload_retries_the_whole_sequence_then_surfaces_the_error() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    mount_get_upload_url(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "status": 503,
            "code": "service_unavailable",
            "message": "busy",
        })))
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    let result = client.upload("a.jpg", "image/jpeg", b"a").await;

    match result {
        Err(StorageError::Api { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected an API error, got {other:?}"),
    }

    // max_retries = 3 means exactly 4 full sequences
    assert_eq!(count_requests(&server, "b2_get_upload_url").await, 4);
    assert_eq!(count_requests(&server, "/upload-target").await, 4);
}

#[tokio::test]
async fn upload_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    mount_get_upload_url(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "code": "bad_request",
            "message": "checksum did not match",
        })))
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    let result = client.upload("a.jpg", "image/jpeg", b"a").await;
    assert!(matches!(result, Err(StorageError::Api { status: 400, .. })));

    assert_eq!(count_requests(&server, "/upload-target").await, 1);
}

#[tokio::test]
async fn expired_auth_token_triggers_reauthorization() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    mount_get_upload_url(&server).await;

    // First upload attempt fails with a stale token, the second succeeds
    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": 401,
            "code": "expired_auth_token",
            "message": "token expired",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload-target"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "fileId": "file-2" })),
        )
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    let stored = client.upload("a.jpg", "image/jpeg", b"a").await.unwrap();
    assert_eq!(stored.file_id, "file-2");

    // The stale token forced a second account authorization
    assert_eq!(count_requests(&server, "b2_authorize_account").await, 2);
}

#[tokio::test]
async fn delete_tolerates_missing_files() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/b2api/v2/b2_delete_file_version"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "code": "file_not_present",
            "message": "file is already gone",
        })))
        .mount(&server)
        .await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    client.delete("file-9", "inspections/abc/photo.jpg").await.unwrap();
}

#[tokio::test]
async fn download_url_uses_the_advertised_endpoint() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    let client = B2Client::new(test_config(&server, 3)).unwrap();
    let url = client.download_url("reports/TST-1.pdf").await.unwrap();
    assert_eq!(
        url,
        format!("{}/dl/file/inspection-photos/reports/TST-1.pdf", server.uri())
    );
}
