//! Router-level tests: requests go through axum without a socket.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use revu::server::{router, AppState};
use revu_core::types::{FileStatus, TrackedFile};
use revu_core::{Session, SessionOptions};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn setup(dir: &Path) -> (Router, Arc<Session>) {
    std::fs::write(dir.join("plan.md"), "a\nb\nc").unwrap();
    std::fs::write(dir.join("main.rs"), "fn main() {}\n").unwrap();
    let files = vec![
        TrackedFile::new("plan.md", FileStatus::Modified),
        TrackedFile::new("main.rs", FileStatus::Added),
    ];
    let session = Session::open(SessionOptions::new(dir), files, None).await.unwrap();
    let app = router(AppState { session: session.clone(), git: None });
    (app, session)
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
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn session_lists_tracked_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, session) = setup(dir.path()).await;

    let (status, body) = send(&app, "GET", "/api/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], session.id());
    assert_eq!(body["round"], 1);
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "plan.md");
    assert_eq!(files[0]["kind"], "document");
    assert_eq!(files[1]["kind"], "code");

    let (status, body) = send(&app, "GET", "/api/rounds", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn comment_endpoints() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, _session) = setup(dir.path()).await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/file/comments?path=plan.md",
        Some(json!({ "start_line": 1, "end_line": 2, "body": "tighten" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["resolved"], false);

    let (status, listed) = send(&app, "GET", "/api/file/comments?path=plan.md", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        &app,
        "PUT",
        "/api/file/comments/1?path=plan.md",
        Some(json!({ "body": "tighten more" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["body"], "tighten more");

    let (status, body) = send(
        &app,
        "PUT",
        "/api/file/comments/9?path=plan.md",
        Some(json!({ "body": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(&app, "DELETE", "/api/file/comments/1?path=plan.md", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    let (_, body) = send(&app, "DELETE", "/api/file/comments/1?path=plan.md", None).await;
    assert_eq!(body["deleted"], false);

    send(
        &app,
        "POST",
        "/api/file/comments?path=main.rs",
        Some(json!({ "start_line": 1, "end_line": 1, "body": "rename", "side": "new" })),
    )
    .await;
    let (_, body) = send(&app, "DELETE", "/api/comments", None).await;
    assert_eq!(body["removed"], 1);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, _session) = setup(dir.path()).await;

    let (status, body) = send(&app, "GET", "/api/file/comments?path=nope.md", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_file");

    let (status, body) = send(
        &app,
        "POST",
        "/api/file/comments?path=plan.md",
        Some(json!({ "start_line": 3, "end_line": 1, "body": "backwards" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = send(&app, "PUT", "/api/share", Some(json!({ "url": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn file_views() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, _session) = setup(dir.path()).await;

    let (status, body) = send(&app, "GET", "/api/file?path=plan.md", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "a\nb\nc");
    assert_eq!(body["stale"], false);

    let (status, body) = send(&app, "GET", "/api/file/diff?path=plan.md", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "document");
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e["type"] == "unchanged"));

    let (status, body) = send(&app, "GET", "/api/file/diff?path=main.rs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "code");
    assert_eq!(body["hunks"], json!([]));
}

#[tokio::test]
async fn round_complete_coalesces() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, _session) = setup(dir.path()).await;

    let (status, body) = send(&app, "POST", "/api/round-complete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], true);
    let (_, body) = send(&app, "POST", "/api/round-complete", None).await;
    assert_eq!(body["queued"], false);
}

#[tokio::test]
async fn finish_releases_waiting_agent() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, session) = setup(dir.path()).await;
    send(
        &app,
        "POST",
        "/api/file/comments?path=plan.md",
        Some(json!({ "start_line": 2, "end_line": 2, "body": "fix b" })),
    )
    .await;

    let agent_app = app.clone();
    let agent = tokio::spawn(async move { send(&agent_app, "GET", "/api/await-review", None).await });
    while !session.rendezvous().has_waiter() {
        tokio::task::yield_now().await;
    }

    let (status, outcome) = send(&app, "POST", "/api/finish", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["agent_notified"], true);

    let (status, received) = agent.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["prompt"], outcome["prompt"]);
    assert_eq!(received["review_file"], outcome["review_file"]);
    assert!(dir.path().join(".revu.json").exists());
}

#[tokio::test]
async fn share_reference_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, _session) = setup(dir.path()).await;

    let (status, _) = send(
        &app,
        "PUT",
        "/api/share",
        Some(json!({ "url": "https://share.example/r/1", "delete_token": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, info) = send(&app, "GET", "/api/session", None).await;
    assert_eq!(info["share_url"], "https://share.example/r/1");

    let (_, body) = send(&app, "DELETE", "/api/share", None).await;
    assert_eq!(body["delete_token"], "secret");
    let (_, info) = send(&app, "GET", "/api/session", None).await;
    assert_eq!(info["share_url"], Value::Null);
}

#[tokio::test]
async fn hung_up_agent_releases_the_slot() {
    let dir = tempfile::TempDir::new().unwrap();
    let (app, session) = setup(dir.path()).await;

    let agent_app = app.clone();
    let agent = tokio::spawn(async move { send(&agent_app, "GET", "/api/await-review", None).await });
    while !session.rendezvous().has_waiter() {
        tokio::task::yield_now().await;
    }

    // Aborting drops the in-flight handler future, as a closed connection does.
    agent.abort();
    assert!(agent.await.unwrap_err().is_cancelled());
    assert!(!session.rendezvous().has_waiter());

    let (_, outcome) = send(&app, "POST", "/api/finish", None).await;
    assert_eq!(outcome["agent_notified"], false);
}
