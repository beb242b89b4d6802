//! Integration tests for archive-vault API endpoints
//!
//! Drives the router with in-memory identity and store backends.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

use archive_common::config::VaultConfig;
use archive_common::data_url;
use archive_vault::identity::{IdentityProvider, MemoryIdentity};
use archive_vault::presenter::{Clipboard, ClipboardBuffer};
use archive_vault::store::{DocumentStore, MemoryStore};
use archive_vault::{build_router, AppState};

struct TestApp {
    state: AppState,
    store: Arc<MemoryStore>,
    clipboard: Arc<ClipboardBuffer>,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router().oneshot(request).await.unwrap()
    }

    async fn wait_for_count(&self, count: usize) {
        let mut rx = self.state.collection.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.len() == count))
            .await
            .expect("timed out waiting for snapshot")
            .expect("snapshot channel closed");
    }
}

/// Test helper: started app with a live session
async fn setup_app() -> TestApp {
    setup_app_with(MemoryIdentity::new()).await
}

async fn setup_app_with(identity: MemoryIdentity) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clipboard = Arc::new(ClipboardBuffer::new());
    let state = AppState::new(
        VaultConfig::default(),
        Arc::new(identity) as Arc<dyn IdentityProvider>,
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        Arc::clone(&clipboard) as Arc<dyn Clipboard>,
    );
    state.start().await;
    TestApp {
        state,
        store,
        clipboard,
    }
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn file_request(name: &str, content_type: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/form/file?name={}", name))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Fill the form and submit it; returns the new record id
async fn upload(app: &TestApp, name: &str, email: &str, file: &str, bytes: Vec<u8>) -> String {
    let response = app
        .send(json_request("PUT", "/api/form", json!({ "name": name, "email": email })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(file_request(file, "application/pdf", bytes)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(test_request("POST", "/api/form/submit")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    body["record_id"].as_str().unwrap().to_string()
}

// =============================================================================
// Health and session
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;
    let response = app.send(test_request("GET", "/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "archive-vault");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_session_ready_after_start() {
    let app = setup_app().await;
    let response = app.send(test_request("GET", "/api/session")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ready");
    let prefix = body["session_prefix"].as_str().unwrap();
    assert_eq!(prefix.len(), 11);
    assert!(prefix.ends_with("..."));
}

#[tokio::test]
async fn test_session_loading_when_sign_in_fails() {
    let identity = MemoryIdentity::new();
    identity.set_offline(true);
    let app = setup_app_with(identity).await;

    let body = extract_json(app.send(test_request("GET", "/api/session")).await.into_body()).await;
    assert_eq!(body, json!({ "status": "loading" }));

    app.send(json_request(
        "PUT",
        "/api/form",
        json!({ "name": "Ann", "email": "ann@uni.edu" }),
    ))
    .await;
    app.send(file_request("a.pdf", "application/pdf", vec![0x25; 16]))
        .await;
    let response = app.send(test_request("POST", "/api/form/submit")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NO_SESSION");
}

// =============================================================================
// Record list
// =============================================================================

#[tokio::test]
async fn test_empty_record_list() {
    let app = setup_app().await;
    let response = app.send(test_request("GET", "/api/records")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["records"], json!([]));
    assert_eq!(body["empty_message"], "NO DATA FRAGMENTS FOUND.");
}

#[tokio::test]
async fn test_upload_appears_in_list() {
    let app = setup_app().await;
    let id = upload(&app, "Ann", "ann@uni.edu", "thesis.pdf", vec![0x25; 2048]).await;
    app.wait_for_count(1).await;

    let body = extract_json(app.send(test_request("GET", "/api/records")).await.into_body()).await;
    assert_eq!(body["count"], 1);
    assert!(body.get("empty_message").is_none());
    assert_eq!(body["records"][0]["id"], id.as_str());
    assert_eq!(body["records"][0]["fileName"], "thesis.pdf");
    assert!(body["records"][0].get("fileData").is_none());
}

#[tokio::test]
async fn test_download_serves_original_pdf() {
    let app = setup_app().await;
    let original: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
    let id = upload(&app, "Ann", "ann@uni.edu", "paper.pdf", original.clone()).await;
    app.wait_for_count(1).await;

    let response = app
        .send(test_request("GET", &format!("/api/records/{}/download", id)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"paper.pdf\""
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.to_vec(), original);
}

#[tokio::test]
async fn test_download_unknown_record() {
    let app = setup_app().await;
    let response = app
        .send(test_request("GET", "/api/records/nope/download"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_copy_field() {
    let app = setup_app().await;
    let id = upload(&app, "Ann", "ann@uni.edu", "a.pdf", vec![0x25; 8]).await;
    app.wait_for_count(1).await;

    let response = app
        .send(test_request("POST", &format!("/api/records/{}/copy/email", id)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["copied"], "ann@uni.edu");
    assert_eq!(app.clipboard.last_copied().as_deref(), Some("ann@uni.edu"));

    let response = app
        .send(test_request("POST", &format!("/api/records/{}/copy/fileData", id)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_requires_confirmation() {
    let app = setup_app().await;
    let id = upload(&app, "Ann", "ann@uni.edu", "a.pdf", vec![0x25; 8]).await;
    app.wait_for_count(1).await;
    let uri = format!("/api/records/{}", id);

    let response = app
        .send(json_request("DELETE", &uri, json!({ "confirmed": false })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["outcome"], "cancelled");
    assert_eq!(
        app.store
            .records(&app.state.config.scope_for(&app.state.session.current().unwrap()))
            .len(),
        1
    );

    let response = app
        .send(json_request("DELETE", &uri, json!({ "confirmed": true })))
        .await;
    assert_eq!(extract_json(response.into_body()).await["outcome"], "deleted");
    app.wait_for_count(0).await;
}

// =============================================================================
// Submission form
// =============================================================================

#[tokio::test]
async fn test_submit_clears_form_and_sets_notice() {
    let app = setup_app().await;
    upload(&app, "Ann", "ann@uni.edu", "a.pdf", vec![0x25; 8]).await;

    let form = extract_json(app.send(test_request("GET", "/api/form")).await.into_body()).await;
    assert_eq!(form["name"], "");
    assert_eq!(form["email"], "");
    assert!(form["file_name"].is_null());
    assert_eq!(form["notice"], "Data Uplink Successful.");
    assert_eq!(form["uploading"], false);
}

#[tokio::test]
async fn test_non_pdf_file_rejected() {
    let app = setup_app().await;
    let response = app
        .send(file_request("photo.png", "image/png", vec![1, 2, 3]))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION");
    assert_eq!(
        body["error"]["message"],
        "System error: only PDF files are accepted."
    );

    let form = extract_json(app.send(test_request("GET", "/api/form")).await.into_body()).await;
    assert!(form["file_name"].is_null());
    assert_eq!(form["error"], "System error: only PDF files are accepted.");
}

#[tokio::test]
async fn test_oversize_file_rejected() {
    let app = setup_app().await;
    let response = app
        .send(file_request("big.pdf", "application/pdf", vec![0; 700 * 1024 + 1]))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body["error"]["message"],
        "Warning: file size must not exceed 700KB."
    );
}

#[tokio::test]
async fn test_very_large_file_clears_previous_selection() {
    let app = setup_app().await;
    let response = app
        .send(file_request("ok.pdf", "application/pdf", vec![0x25; 64]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(file_request("huge.pdf", "application/pdf", vec![0; 17 * 1024 * 1024]))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body["error"]["message"],
        "Warning: file size must not exceed 700KB."
    );

    let form = extract_json(app.send(test_request("GET", "/api/form")).await.into_body()).await;
    assert!(form["file_name"].is_null());
    assert_eq!(form["error"], "Warning: file size must not exceed 700KB.");
}

#[tokio::test]
async fn test_file_at_limit_accepted_over_http() {
    let app = setup_app().await;
    let response = app
        .send(file_request("limit.pdf", "application/pdf", vec![0x25; 700 * 1024]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let form = extract_json(response.into_body()).await;
    assert_eq!(form["file_name"], "limit.pdf");
}

#[tokio::test]
async fn test_file_label_truncated() {
    let app = setup_app().await;
    let response = app
        .send(file_request(
            "an-extremely-long-document-name.pdf",
            "application/pdf; charset=binary",
            vec![0x25; 8],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let form = extract_json(response.into_body()).await;
    assert_eq!(form["file_name"], "an-extremely-long-document-name.pdf");
    assert_eq!(form["file_label"], "an-extremely-lo...");
}

#[tokio::test]
async fn test_file_requires_name() {
    let app = setup_app().await;
    let response = app
        .send(file_request("", "application/pdf", vec![0x25; 8]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_institutional_email_rejected() {
    let app = setup_app().await;
    app.send(json_request(
        "PUT",
        "/api/form",
        json!({ "name": "Ann", "email": "ann@gmail.com" }),
    ))
    .await;
    app.send(file_request("a.pdf", "application/pdf", vec![0x25; 8]))
        .await;

    let response = app.send(test_request("POST", "/api/form/submit")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["message"], "Access denied: use a .edu email only.");

    let form = extract_json(app.send(test_request("GET", "/api/form")).await.into_body()).await;
    assert_eq!(form["email"], "ann@gmail.com");
    assert_eq!(form["file_name"], "a.pdf");
}

#[tokio::test]
async fn test_upload_failure_keeps_form() {
    let app = setup_app().await;
    app.store.set_offline(true);
    app.send(json_request(
        "PUT",
        "/api/form",
        json!({ "name": "Ann", "email": "ann@uni.edu" }),
    ))
    .await;
    app.send(file_request("a.pdf", "application/pdf", vec![0x25; 8]))
        .await;

    let response = app.send(test_request("POST", "/api/form/submit")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["message"], "Connection lost. Please try again.");

    let form = extract_json(app.send(test_request("GET", "/api/form")).await.into_body()).await;
    assert_eq!(form["name"], "Ann");
    assert_eq!(form["file_name"], "a.pdf");
    assert_eq!(form["uploading"], false);
}

#[tokio::test]
async fn test_clear_file() {
    let app = setup_app().await;
    app.send(file_request("a.pdf", "application/pdf", vec![0x25; 8]))
        .await;
    let response = app.send(test_request("DELETE", "/api/form/file")).await;
    let form = extract_json(response.into_body()).await;
    assert!(form["file_name"].is_null());
}

// =============================================================================
// Events and UI
// =============================================================================

#[tokio::test]
async fn test_event_stream_starts_with_snapshot() {
    let app = setup_app().await;
    let scope = app
        .state
        .config
        .scope_for(&app.state.session.current().unwrap());
    app.store
        .create(
            &scope,
            archive_common::NewRecord {
                name: "Ann".to_string(),
                email: "ann@uni.edu".to_string(),
                file_name: "a.pdf".to_string(),
                file_data: data_url::encode_pdf(b"%PDF"),
            },
        )
        .await
        .unwrap();
    app.wait_for_count(1).await;

    let response = app.send(test_request("GET", "/api/events")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for first event")
        .expect("stream ended")
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: SnapshotUpdated"));
    assert!(text.contains("\"count\":1"));
}

#[tokio::test]
async fn test_serves_ui() {
    let app = setup_app().await;
    let response = app.send(test_request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(test_request("GET", "/static/app.js")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/javascript"
    );
}
