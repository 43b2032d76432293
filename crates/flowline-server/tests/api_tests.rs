use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use flowline_core::{CoreError, LockHandle, LockService, NoopTelemetrySink, Project};
use flowline_server::{api::build_router, AppState};
use flowline_state_inmemory::InMemoryStateStoreProvider;

mock! {
    pub Lock {}

    #[async_trait]
    impl LockService for Lock {
        async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn LockHandle>, CoreError>;
    }
}

fn app() -> Router {
    build_router(Arc::new(AppState::in_memory(Duration::from_millis(5000))))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_project(app: &Router) -> String {
    let (status, project) = send(app, "POST", "/v1/projects", Some(json!({ "displayName": "Acme" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    project["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_state_store_up() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["dependencies"]["stateStore"]["status"], "UP");
}

#[tokio::test]
async fn flow_lifecycle_over_http() {
    let app = app();
    let project_id = create_project(&app).await;
    let flows = format!("/v1/projects/{}/flows", project_id);

    let (status, flow) = send(&app, "POST", &flows, Some(json!({ "displayName": "Orders" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(flow["status"], "UNPUBLISHED");
    assert_eq!(flow["version"]["displayName"], "Orders");
    assert_eq!(flow["version"]["trigger"]["type"], "EMPTY");
    assert_eq!(flow["version"]["trigger"]["valid"], false);
    let flow_url = format!("{}/{}", flows, flow["id"].as_str().unwrap());

    let (status, renamed) = send(
        &app,
        "POST",
        &flow_url,
        Some(json!({ "type": "CHANGE_NAME", "request": { "displayName": "Orders v2" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["version"]["displayName"], "Orders v2");
    assert_eq!(renamed["version"]["id"], flow["version"]["id"]);

    let (status, instance) = send(&app, "POST", &format!("{}/publish", flow_url), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "ENABLED");
    let published_id = instance["flowVersionId"].as_str().unwrap().to_string();

    let (_, published) = send(&app, "GET", &flow_url, None).await;
    assert_eq!(published["status"], "ENABLED");
    assert_eq!(published["publishedVersionId"], published_id.as_str());
    assert_eq!(published["version"]["state"], "LOCKED");

    // Editing a locked version forks a new draft
    let (status, edited) = send(
        &app,
        "POST",
        &flow_url,
        Some(json!({ "type": "CHANGE_NAME", "request": { "displayName": "Orders v3" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(edited["version"]["id"], published_id.as_str());
    assert_eq!(edited["version"]["state"], "DRAFT");

    let (status, old) = send(&app, "GET", &format!("{}?versionId={}", flow_url, published_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(old["version"]["displayName"], "Orders v2");
    assert_eq!(old["version"]["state"], "LOCKED");

    let (status, _) = send(&app, "DELETE", &flow_url, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &flow_url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_ENTITY_NOT_FOUND");
}

#[tokio::test]
async fn run_finishes_once() {
    let app = app();
    let project_id = create_project(&app).await;
    let (_, flow) = send(
        &app,
        "POST",
        &format!("/v1/projects/{}/flows", project_id),
        Some(json!({ "displayName": "Orders" })),
    )
    .await;
    let runs = format!("/v1/projects/{}/flow-runs", project_id);

    let (status, run) = send(
        &app,
        "POST",
        &runs,
        Some(json!({ "flowVersionId": flow["version"]["id"], "environment": "TESTING" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(run["status"], "RUNNING");
    assert!(run["finishTime"].is_null());
    let run_url = format!("{}/{}", runs, run["id"].as_str().unwrap());

    let finish = json!({ "status": "SUCCEEDED", "logsFileId": "logs-1" });
    let (status, finished) = send(&app, "POST", &format!("{}/finish", run_url), Some(finish.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["status"], "SUCCEEDED");
    assert!(finished["finishTime"].is_string());

    let (status, body) = send(&app, "POST", &format!("{}/finish", run_url), Some(finish)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_FLOW_RUN_ALREADY_FINISHED");

    let (status, page) = send(&app, "GET", &format!("{}?status=SUCCEEDED", runs), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);

    let (_, page) = send(&app, "GET", &format!("{}?status=FAILED", runs), None).await;
    assert!(page["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn folder_sentinel_filters_list_and_count() {
    let app = app();
    let project_id = create_project(&app).await;
    let flows = format!("/v1/projects/{}/flows", project_id);

    send(&app, "POST", &flows, Some(json!({ "displayName": "Loose" }))).await;
    send(&app, "POST", &flows, Some(json!({ "displayName": "Filed", "folderId": "folder-1" }))).await;

    let (status, page) = send(&app, "GET", &format!("{}?folderId=NULL", flows), None).await;
    assert_eq!(status, StatusCode::OK);
    let data = page["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["version"]["displayName"], "Loose");

    let (_, count) = send(&app, "GET", &format!("{}/count?folderId=folder-1", flows), None).await;
    assert_eq!(count, json!(1));
    let (_, count) = send(&app, "GET", &format!("{}/count", flows), None).await;
    assert_eq!(count, json!(2));
}

#[tokio::test]
async fn paging_walks_forward_with_cursor() {
    let app = app();
    let project_id = create_project(&app).await;
    let flows = format!("/v1/projects/{}/flows", project_id);
    for name in ["a", "b", "c"] {
        send(&app, "POST", &flows, Some(json!({ "displayName": name }))).await;
    }

    let (_, first) = send(&app, "GET", &format!("{}?limit=2", flows), None).await;
    assert_eq!(first["data"].as_array().unwrap().len(), 2);
    let next = first["next"].as_str().unwrap();

    let (_, second) = send(&app, "GET", &format!("{}?limit=2&cursor={}", flows, next), None).await;
    assert_eq!(second["data"].as_array().unwrap().len(), 1);
    assert!(second["next"].is_null());
    assert!(second["previous"].is_string());
}

#[tokio::test]
async fn malformed_cursor_is_a_validation_error() {
    let app = app();
    let project_id = create_project(&app).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/projects/{}/flows?cursor=not-a-cursor", project_id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_VALIDATION");
}

#[tokio::test]
async fn deleting_unknown_project_is_not_found() {
    let app = app();
    let (status, body) = send(&app, "DELETE", "/v1/projects/missing", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_NOT_FOUND");
}

#[tokio::test]
async fn lock_timeout_surfaces_as_conflict() {
    let repos = InMemoryStateStoreProvider::new().create_repositories();
    let project = Project::new("Acme");
    repos.projects.save(&project).await.unwrap();

    let mut lock = MockLock::new();
    lock.expect_acquire().returning(|key, timeout| {
        Err(CoreError::LockTimeout {
            key: key.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    });

    let state = AppState::new(
        repos.into(),
        Arc::new(lock),
        Arc::new(NoopTelemetrySink),
        Duration::from_millis(50),
    );
    let app = build_router(Arc::new(state));
    let flows = format!("/v1/projects/{}/flows", project.id);

    let (status, flow) = send(&app, "POST", &flows, Some(json!({ "displayName": "Orders" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{}/{}", flows, flow["id"].as_str().unwrap()),
        Some(json!({ "type": "LOCK_FLOW" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_LOCK_TIMEOUT");
    assert!(body["error"].as_str().unwrap().contains("50ms"));
}

#[tokio::test]
async fn published_flow_can_be_disabled_and_enabled() {
    let app = app();
    let project_id = create_project(&app).await;
    let flows = format!("/v1/projects/{}/flows", project_id);
    let (_, flow) = send(&app, "POST", &flows, Some(json!({ "displayName": "Orders" }))).await;
    let flow_url = format!("{}/{}", flows, flow["id"].as_str().unwrap());
    let status_url = format!("{}/status", flow_url);

    let (status, body) = send(&app, "POST", &status_url, Some(json!({ "status": "DISABLED" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_VALIDATION");

    let (status, _) = send(&app, "POST", &format!("{}/publish", flow_url), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, instance) = send(&app, "POST", &status_url, Some(json!({ "status": "DISABLED" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "DISABLED");
    let (_, read) = send(&app, "GET", &flow_url, None).await;
    assert_eq!(read["status"], "DISABLED");

    let (status, instance) = send(&app, "POST", &status_url, Some(json!({ "status": "ENABLED" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "ENABLED");
}

#[tokio::test]
async fn no_folder_sentinel_is_rejected_as_folder_id() {
    let app = app();
    let project_id = create_project(&app).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/projects/{}/flows", project_id),
        Some(json!({ "displayName": "Orders", "folderId": "NULL" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_VALIDATION");
}
