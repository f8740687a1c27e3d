//! End-to-end tests for the farm HTTP API over the in-memory adapters

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestRequest, TestServer};
use chrono::{Duration, Utc};
use common::auth::{IdentityProvider, JwtConfig, JwtIdentityProvider, Role};
use common::memory::{InMemoryBlobStore, InMemoryDirectory, InMemoryFarmStore};
use farm_api::{build_app, AppState, FarmAdapters, HttpServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;

const FARMER: &str = "1";
const OTHER_FARMER: &str = "2";
const VET: &str = "5";
const OPERATOR: &str = "9";
const PIG: &str = "10";
const SECOND_PIG: &str = "11";

struct TestApp {
    server: TestServer,
    identity: Arc<JwtIdentityProvider>,
    blobs: InMemoryBlobStore,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_attachment_limit(1024).await
    }

    async fn with_attachment_limit(max_attachment_bytes: usize) -> Self {
        let directory = InMemoryDirectory::new();
        directory.add_animal(PIG, FARMER).await;
        directory.add_animal(SECOND_PIG, FARMER).await;
        directory.add_animal("20", OTHER_FARMER).await;
        directory.add_veterinarian(VET).await;

        let blobs = InMemoryBlobStore::new();
        let identity = Arc::new(JwtIdentityProvider::new(JwtConfig::new(
            "http-test-secret".to_string(),
            1,
        )));

        let state = AppState::new(
            FarmAdapters::in_memory(InMemoryFarmStore::new(), directory, blobs.clone()),
            identity.clone(),
            max_attachment_bytes,
        );
        let server = TestServer::new(build_app(&HttpServerConfig::default(), state)).unwrap();

        Self {
            server,
            identity,
            blobs,
        }
    }

    fn token(&self, user_id: &str, role: Role) -> HeaderValue {
        let token = self.identity.generate_token(user_id, role).unwrap();
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }

    fn as_user(&self, request: TestRequest, user_id: &str, role: Role) -> TestRequest {
        request.add_header(AUTHORIZATION, self.token(user_id, role))
    }

    fn farmer(&self, request: TestRequest) -> TestRequest {
        self.as_user(request, FARMER, Role::Farmer)
    }

    fn vet(&self, request: TestRequest) -> TestRequest {
        self.as_user(request, VET, Role::Veterinarian)
    }

    fn operator(&self, request: TestRequest) -> TestRequest {
        self.as_user(request, OPERATOR, Role::Operator)
    }

    async fn register_device(&self, external_id: &str) {
        self.operator(self.server.post("/devices"))
            .json(&json!({"external_id": external_id, "name": "Ear tag"}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    /// Create a request from the farmer to the vet for the pig; returns its id
    async fn create_request(&self) -> String {
        let response = self
            .farmer(self.server.post("/service-requests"))
            .json(&json!({
                "provider_id": 5,
                "animal_id": 10,
                "purpose": "checkup",
                "scheduled_time": Utc::now() + Duration::days(1),
                "urgency_level": "medium",
                "description": "coughing since monday"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["status"], "pending");
        body["id"].as_str().unwrap().to_string()
    }

    async fn set_status(&self, id: &str, status: &str) -> StatusCode {
        self.vet(self.server.patch(&format!("/service-requests/{}/status", id)))
            .json(&json!({"status": status}))
            .await
            .status_code()
    }
}

fn assert_forbidden(body: &Value) {
    assert_eq!(body["error"], "forbidden");
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new().await;

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthenticated() {
    let app = TestApp::new().await;

    app.server
        .get("/devices")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .get("/devices")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_device_reassignment_after_release() {
    let app = TestApp::new().await;
    app.register_device("D-100").await;

    let response = app
        .farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 10}))
        .await;
    response.assert_status_ok();
    let first: Value = response.json();
    assert_eq!(first["animal_id"], PIG);
    assert!(first["removed_at"].is_null());

    app.farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 11}))
        .await
        .assert_status(StatusCode::CONFLICT);

    let released: Value = app
        .farmer(app.server.post("/devices/D-100/release"))
        .await
        .json();
    assert_eq!(released["released"], true);
    assert!(released["assignment"]["removed_at"].is_string());

    // Releasing again is a no-op
    let again: Value = app
        .farmer(app.server.post("/devices/D-100/release"))
        .await
        .json();
    assert_eq!(again["released"], false);
    assert!(again["assignment"].is_null());

    app.farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 11}))
        .await
        .assert_status_ok();

    let history: Value = app
        .farmer(app.server.get("/devices/D-100/history"))
        .await
        .json();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["animal_id"], SECOND_PIG);
    assert!(history[0]["removed_at"].is_null());
    assert_eq!(history[1]["animal_id"], PIG);

    let device: Value = app.farmer(app.server.get("/devices/D-100")).await.json();
    assert_eq!(device["current_assignment"]["animal_id"], SECOND_PIG);

    let current: Value = app
        .farmer(app.server.get("/devices/D-100/assignment"))
        .await
        .json();
    assert_eq!(current["animal_id"], SECOND_PIG);
}

#[tokio::test]
async fn test_animal_cannot_wear_two_devices() {
    let app = TestApp::new().await;
    app.register_device("D-100").await;
    app.register_device("D-200").await;

    app.farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 10}))
        .await
        .assert_status_ok();

    app.farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-200", "animal_id": 10}))
        .await
        .assert_status(StatusCode::CONFLICT);

    let available: Value = app
        .farmer(app.server.get("/devices/available"))
        .await
        .json();
    let available = available.as_array().unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0]["external_id"], "D-200");

    let open: Value = app
        .operator(app.server.get("/devices/assignments"))
        .await
        .json();
    assert_eq!(open.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_farmer_cannot_assign_someone_elses_animal() {
    let app = TestApp::new().await;
    app.register_device("D-100").await;

    let response = app
        .farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 20}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_forbidden(&response.json());
}

#[tokio::test]
async fn test_device_registry_is_operator_only() {
    let app = TestApp::new().await;

    app.farmer(app.server.post("/devices"))
        .json(&json!({"external_id": "D-100", "name": "Ear tag"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.register_device("D-100").await;
    app.operator(app.server.post("/devices"))
        .json(&json!({"external_id": "D-100", "name": "Duplicate"}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deactivating_assigned_device_conflicts() {
    let app = TestApp::new().await;
    app.register_device("D-100").await;
    app.farmer(app.server.post("/devices/assign"))
        .json(&json!({"device_id": "D-100", "animal_id": 10}))
        .await
        .assert_status_ok();

    app.operator(app.server.patch("/devices/D-100/status"))
        .json(&json!({"status": "inactive"}))
        .await
        .assert_status(StatusCode::CONFLICT);

    app.operator(app.server.patch("/devices/D-100/status"))
        .json(&json!({"status": "broken"}))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_visit_lifecycle_with_chat() {
    let app = TestApp::new().await;
    let id = app.create_request().await;

    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    app.vet(app.server.post(&format!("/service-requests/{}/messages", id)))
        .json(&json!({"body": "bring the pig tomorrow"}))
        .await
        .assert_status(StatusCode::CREATED);

    let unread: Value = app
        .farmer(app.server.get(&format!("/service-requests/{}/messages/unread", id)))
        .await
        .json();
    assert_eq!(unread["unread"], 1);

    let marked: Value = app
        .farmer(app.server.post(&format!("/service-requests/{}/messages/read", id)))
        .await
        .json();
    assert_eq!(marked["updated"], 1);

    let messages: Value = app
        .farmer(app.server.get(&format!("/service-requests/{}/messages", id)))
        .await
        .json();
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "bring the pig tomorrow");
    assert_eq!(messages[0]["sender_id"], VET);
    assert_eq!(messages[0]["is_read"], true);

    // Marking again changes nothing and never flips back
    let marked: Value = app
        .farmer(app.server.post(&format!("/service-requests/{}/messages/read", id)))
        .await
        .json();
    assert_eq!(marked["updated"], 0);

    let response = app
        .vet(app.server.post(&format!("/service-requests/{}/visit-record", id)))
        .json(&json!({"diagnosis": "mild bronchitis", "treatment": "antibiotics", "fee": 4500}))
        .await;
    response.assert_status(StatusCode::CREATED);

    let request: Value = app
        .farmer(app.server.get(&format!("/service-requests/{}", id)))
        .await
        .json();
    assert_eq!(request["status"], "completed");

    let visit: Value = app
        .farmer(app.server.get(&format!("/service-requests/{}/visit-record", id)))
        .await
        .json();
    assert_eq!(visit["diagnosis"], "mild bronchitis");
    assert_eq!(visit["fee"], 4500);

    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::CONFLICT);
    assert_eq!(app.set_status(&id, "completed").await, StatusCode::OK);

    // The thread is read-only once the visit is done
    app.farmer(app.server.post(&format!("/service-requests/{}/messages", id)))
        .json(&json!({"body": "thanks"}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pending_cannot_jump_to_completed() {
    let app = TestApp::new().await;
    let id = app.create_request().await;

    assert_eq!(app.set_status(&id, "completed").await, StatusCode::CONFLICT);
    assert_eq!(app.set_status(&id, "rejected").await, StatusCode::OK);
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_requester_cannot_move_status() {
    let app = TestApp::new().await;
    let id = app.create_request().await;

    app.farmer(app.server.patch(&format!("/service-requests/{}/status", id)))
        .json(&json!({"status": "accepted"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_outsider_and_unknown_request_look_the_same() {
    let app = TestApp::new().await;
    let id = app.create_request().await;
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    let outsider = |request| app.as_user(request, OTHER_FARMER, Role::Farmer);

    let denied = outsider(app.server.get(&format!("/service-requests/{}", id))).await;
    let missing = outsider(app.server.get("/service-requests/does-not-exist")).await;
    denied.assert_status(StatusCode::FORBIDDEN);
    missing.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(denied.json::<Value>(), missing.json::<Value>());
    assert_forbidden(&denied.json());

    outsider(app.server.get(&format!("/service-requests/{}/messages", id)))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    outsider(app.server.post(&format!("/service-requests/{}/messages", id)))
        .json(&json!({"body": "hello"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    outsider(app.server.post(&format!("/service-requests/{}/messages/read", id)))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let listed: Value = outsider(app.server.get("/service-requests")).await.json();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_request_validation() {
    let app = TestApp::new().await;

    let past = app
        .farmer(app.server.post("/service-requests"))
        .json(&json!({
            "provider_id": 5,
            "animal_id": 10,
            "purpose": "checkup",
            "scheduled_time": Utc::now() - Duration::hours(1)
        }))
        .await;
    past.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(past.json::<Value>()["code"], "VALIDATION_ERROR");

    app.farmer(app.server.post("/service-requests"))
        .json(&json!({
            "provider_id": 5,
            "animal_id": 10,
            "purpose": "checkup",
            "scheduled_time": Utc::now() + Duration::days(1),
            "urgency_level": "whenever"
        }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Default urgency when omitted
    let created: Value = app
        .farmer(app.server.post("/service-requests"))
        .json(&json!({
            "provider_id": "5",
            "animal_id": "10",
            "purpose": "checkup",
            "scheduled_time": Utc::now() + Duration::days(1)
        }))
        .await
        .json();
    assert_eq!(created["urgency_level"], "medium");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let app = TestApp::new().await;
    let id = app.create_request().await;
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    app.farmer(app.server.post(&format!("/service-requests/{}/messages", id)))
        .json(&json!({"body": "   "}))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_attachment_upload_and_download() {
    let app = TestApp::new().await;
    let id = app.create_request().await;
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    let form = MultipartForm::new().add_text("body", "x-ray").add_part(
        "file",
        Part::bytes(b"fake image bytes".to_vec())
            .file_name("x-ray.png")
            .mime_type("image/png"),
    );
    let response = app
        .farmer(app.server.post(&format!("/service-requests/{}/attachments", id)))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let message: Value = response.json();
    assert_eq!(message["body"], "x-ray");
    assert_eq!(message["attachment"]["name"], "x-ray.png");
    assert_eq!(message["attachment"]["size_bytes"], 16);
    assert!(message["attachment"].get("storage_key").is_none());

    let message_id = message["id"].as_str().unwrap();
    let download = app
        .vet(app.server.get(&format!(
            "/service-requests/{}/messages/{}/attachment",
            id, message_id
        )))
        .await;
    download.assert_status_ok();
    assert_eq!(download.header("content-type"), "image/png");
    assert_eq!(download.as_bytes().as_ref(), b"fake image bytes");
}

#[tokio::test]
async fn test_attachment_limits_and_storage_failure() {
    let app = TestApp::with_attachment_limit(8).await;
    let id = app.create_request().await;
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    let too_large = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![0u8; 9]).file_name("big.bin"),
    );
    app.farmer(app.server.post(&format!("/service-requests/{}/attachments", id)))
        .multipart(too_large)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let no_file = MultipartForm::new().add_text("body", "caption only");
    app.farmer(app.server.post(&format!("/service-requests/{}/attachments", id)))
        .multipart(no_file)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    app.blobs.fail_writes(true);
    let small = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![1u8; 4]).file_name("small.bin"),
    );
    app.farmer(app.server.post(&format!("/service-requests/{}/attachments", id)))
        .multipart(small)
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    let messages: Value = app
        .farmer(app.server.get(&format!("/service-requests/{}/messages", id)))
        .await
        .json();
    assert!(messages.as_array().unwrap().is_empty());
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn test_malformed_json_uses_error_body() {
    let app = TestApp::new().await;

    let missing_fields = app
        .farmer(app.server.post("/service-requests"))
        .json(&json!({"purpose": "vaccination"}))
        .await;
    missing_fields.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = missing_fields.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].is_string());

    let not_json = app
        .farmer(app.server.post("/service-requests"))
        .text("purpose=vaccination")
        .await;
    not_json.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = not_json.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_multipart_post_to_messages_attaches_file() {
    let app = TestApp::new().await;
    let id = app.create_request().await;
    assert_eq!(app.set_status(&id, "accepted").await, StatusCode::OK);

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"lab results".to_vec())
            .file_name("labs.pdf")
            .mime_type("application/pdf"),
    );
    let response = app
        .vet(app.server.post(&format!("/service-requests/{}/messages", id)))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let message: Value = response.json();
    assert_eq!(message["attachment"]["name"], "labs.pdf");
    assert!(message["body"].is_null());

    let text = app
        .farmer(app.server.post(&format!("/service-requests/{}/messages", id)))
        .json(&json!({"body": "thanks"}))
        .await;
    text.assert_status(StatusCode::CREATED);

    let thread: Vec<Value> = app
        .farmer(app.server.get(&format!("/service-requests/{}/messages", id)))
        .await
        .json();
    assert_eq!(thread.len(), 2);
}
