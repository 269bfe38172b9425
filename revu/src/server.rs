//! HTTP surface: comment CRUD, round control, the live event stream and the
//! blocking agent endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::Stream;
use revu_core::error::{codes, ReviewError};
use revu_core::types::{Comment, FinishOutcome, Hunk, ReviewPrompt, RoundDiff, RoundRecord, SessionInfo, Side};
use revu_core::types::{FileContent, FileKind};
use revu_core::Session;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::git::GitHandle;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub git: Option<GitHandle>,
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(session_info))
        .route("/api/rounds", get(rounds))
        .route("/api/file", get(file_content))
        .route("/api/file/diff", get(file_diff))
        .route("/api/file/comments", get(list_comments).post(add_comment))
        .route("/api/file/comments/{id}", put(update_comment).delete(delete_comment))
        .route("/api/comments", delete(clear_comments))
        .route("/api/finish", post(finish))
        .route("/api/round-complete", post(round_complete))
        .route("/api/await-review", get(await_review))
        .route("/api/events", get(events))
        .route("/api/share", put(set_share).delete(clear_share))
        .with_state(state)
}

/// `ReviewError` rendered as a JSON error response.
pub struct ApiError(ReviewError);

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match code {
            codes::UNKNOWN_FILE | codes::NOT_FOUND => StatusCode::NOT_FOUND,
            codes::INVALID_INPUT => StatusCode::BAD_REQUEST,
            codes::DISCONNECTED => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": code, "message": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Deserialize)]
struct NewComment {
    start_line: u32,
    end_line: u32,
    body: String,
    #[serde(default)]
    side: Option<Side>,
}

#[derive(Deserialize)]
struct CommentEdit {
    body: String,
}

#[derive(Deserialize)]
struct ShareRequest {
    url: String,
    #[serde(default)]
    delete_token: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum FileDiffResponse {
    Document(RoundDiff),
    Code { path: String, hunks: Vec<Hunk> },
}

async fn session_info(State(state): State<AppState>) -> Json<SessionInfo> {
    Json(state.session.info())
}

async fn rounds(State(state): State<AppState>) -> ApiResult<Vec<RoundRecord>> {
    Ok(Json(state.session.rounds().await?))
}

async fn file_content(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<FileContent> {
    Ok(Json(state.session.file_content(&q.path)?))
}

async fn file_diff(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<FileDiffResponse> {
    match state.session.file_kind(&q.path)? {
        FileKind::Document => Ok(Json(FileDiffResponse::Document(state.session.file_diff(&q.path)?))),
        FileKind::Code => {
            let hunks = match &state.git {
                Some(git) => git
                    .file_diff(&q.path, &state.session.options().base_ref)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(path = %q.path, error = %e, "git diff failed");
                        Vec::new()
                    }),
                None => Vec::new(),
            };
            Ok(Json(FileDiffResponse::Code { path: q.path, hunks }))
        }
    }
}

async fn list_comments(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<Vec<Comment>> {
    Ok(Json(state.session.list_comments(&q.path)?))
}

async fn add_comment(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
    Json(req): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment =
        state.session.add_comment(&q.path, req.start_line, req.end_line, &req.body, req.side)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<PathQuery>,
    Json(req): Json<CommentEdit>,
) -> ApiResult<Comment> {
    Ok(Json(state.session.update_comment(&q.path, id, &req.body)?))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<PathQuery>,
) -> ApiResult<serde_json::Value> {
    let deleted = state.session.delete_comment(&q.path, id)?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn clear_comments(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.session.clear_all_comments();
    Json(json!({ "removed": removed }))
}

async fn finish(State(state): State<AppState>) -> ApiResult<FinishOutcome> {
    Ok(Json(state.session.finish().await?))
}

async fn round_complete(State(state): State<AppState>) -> Json<serde_json::Value> {
    let queued = state.session.signal_round_complete();
    Json(json!({ "queued": queued }))
}

/// Parks until the reviewer finishes. A client that hangs up drops this
/// future, which releases the rendezvous slot.
async fn await_review(State(state): State<AppState>) -> ApiResult<ReviewPrompt> {
    debug!("agent waiting for review");
    Ok(Json(state.session.rendezvous().wait().await?))
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.session.subscribe();
    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        let event = sub.recv().await?;
        let sse = Event::default()
            .event(event.name())
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().event(event.name()));
        Some((Ok(sse), sub))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn set_share(
    State(state): State<AppState>,
    Json(req): Json<ShareRequest>,
) -> Result<StatusCode, ApiError> {
    if req.url.trim().is_empty() {
        return Err(ReviewError::InvalidInput("share url is empty".to_owned()).into());
    }
    state.session.set_share(req.url, req.delete_token).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_share(State(state): State<AppState>) -> Json<serde_json::Value> {
    let delete_token = state.session.clear_share().await;
    Json(json!({ "delete_token": delete_token }))
}
