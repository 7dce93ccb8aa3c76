mod common;

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use time_study_timer::{create_router, state::StudyStatus, AppState};
use tower::ServiceExt;

use common::{milling_study, ScriptedRemote};

fn app(status: StudyStatus) -> Router {
    let remote = ScriptedRemote::with_study(milling_study(status));
    let state = Arc::new(AppState::new(remote, Duration::from_secs(5), 20554, "127.0.0.1".into()));
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(StudyStatus::NotStarted);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn session_must_be_opened_first() {
    let app = app(StudyStatus::NotStarted);
    let (status, body) = send(&app, "GET", "/studies/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn open_start_and_stop_a_study() {
    let app = app(StudyStatus::NotStarted);

    let (status, body) = send(&app, "POST", "/studies/1/open", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "not started");
    assert_eq!(body["session"]["steps"].as_array().unwrap().len(), 3);

    let (status, body) = send(&app, "POST", "/studies/1/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "in progress");
    assert_eq!(body["session"]["process"]["running"], true);
    assert_eq!(body["session"]["pending_confirmation"], false);

    let (status, body) = send(&app, "POST", "/studies/1/stop", Some(json!({ "notes": "ok" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "completed");
    assert_eq!(body["session"]["notes"], "ok");

    let (status, body) = send(&app, "POST", "/studies/1/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "study_finalized");
}

#[tokio::test]
async fn blank_scrap_reason_is_unprocessable() {
    let app = app(StudyStatus::InProgress);
    send(&app, "POST", "/studies/1/open", None).await;

    let (status, body) = send(&app, "POST", "/studies/1/scrap", Some(json!({ "notes": "  " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");

    let (status, body) = send(&app, "POST", "/studies/1/scrap", Some(json!({ "notes": "chuck failure" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "scrapped");
}

#[tokio::test]
async fn step_start_requires_running_process() {
    let app = app(StudyStatus::InProgress);
    send(&app, "POST", "/studies/1/open", None).await;

    let (status, body) = send(&app, "POST", "/studies/1/steps/1/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "process_not_running");

    send(&app, "POST", "/studies/1/start", None).await;
    let (status, body) = send(&app, "POST", "/studies/1/steps/2/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");

    let (status, body) = send(
        &app,
        "POST",
        "/studies/1/steps/2/start",
        Some(json!({ "confirm_re_time": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["steps"][1]["running"], true);
    assert_eq!(body["session"]["steps"][1]["completed"], false);
}

#[tokio::test]
async fn reset_without_confirmation_is_refused() {
    let app = app(StudyStatus::InProgress);
    send(&app, "POST", "/studies/1/open", None).await;

    let (status, _) = send(&app, "POST", "/studies/1/reset", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, "POST", "/studies/1/reset", Some(json!({ "confirm": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["process"]["elapsed_seconds"], 0);
}

#[tokio::test]
async fn export_serves_csv() {
    let app = app(StudyStatus::InProgress);
    send(&app, "POST", "/studies/1/open", None).await;

    let request = Request::builder()
        .uri("/studies/1/export.csv")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\"Study Name\",\"Milling Operation XYZ\""));
    assert!(text.contains("\"2\",\"Load material\",\"00:02:00\",\"00:01:30\",\"\""));
}

#[tokio::test]
async fn status_lists_open_studies() {
    let app = app(StudyStatus::NotStarted);
    send(&app, "POST", "/studies/1/open", None).await;

    let (status, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["open_studies"], json!([1]));
    assert_eq!(body["last_action"], "open study 1");
}

#[tokio::test]
async fn malformed_body_is_reported_not_defaulted() {
    let app = app(StudyStatus::InProgress);
    send(&app, "POST", "/studies/1/open", None).await;

    let (status, body) = send(&app, "POST", "/studies/1/reset", Some(json!({ "confirm": "yes" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("invalid type"), "{}", message);
    assert!(!message.contains("must be confirmed"), "{}", message);

    let (status, body) = send(&app, "POST", "/studies/1/scrap", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("scrap reason"));
}
