use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::SubjectUpdate;
use crate::state::AppState;
use crate::workflow::orchestrator::ReplyEvent;
use crate::workflow::registry::SharedWorkspace;
use crate::workflow::workspace::{WorkflowError, WorkspaceView};

/// Suggestions offered by the subject name field.
pub const COMMON_SUBJECTS: [&str; 14] = [
    "Mathematics",
    "English",
    "Physics",
    "Chemistry",
    "Biology",
    "History",
    "Geography",
    "Computer Science",
    "Economics",
    "Art",
    "Music",
    "Psychology",
    "Sociology",
    "Business Studies",
];

const REPLY_CHANNEL_CAPACITY: usize = 64;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

async fn lookup(state: &AppState, id: Uuid) -> Result<SharedWorkspace, AppError> {
    state
        .workspaces
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Workspace {id} not found")))
}

/// GET /api/v1/subjects/common
pub async fn handle_common_subjects() -> Json<Vec<&'static str>> {
    Json(COMMON_SUBJECTS.to_vec())
}

/// POST /api/v1/workspaces
pub async fn handle_create_workspace(
    State(state): State<AppState>,
) -> (StatusCode, Json<WorkspaceView>) {
    let workspace = state.workspaces.create().await;
    let view = workspace.lock().await.view();
    (StatusCode::CREATED, Json(view))
}

/// GET /api/v1/workspaces/:id
pub async fn handle_get_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceView>, AppError> {
    let workspace = lookup(&state, id).await?;
    let view = workspace.lock().await.view();
    Ok(Json(view))
}

/// DELETE /api/v1/workspaces/:id
pub async fn handle_delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.workspaces.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Workspace {id} not found")))
    }
}

/// POST /api/v1/workspaces/:id/subjects
pub async fn handle_add_subject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<WorkspaceView>), AppError> {
    let workspace = lookup(&state, id).await?;
    let mut ws = workspace.lock().await;
    ws.add_subject()?;
    Ok((StatusCode::CREATED, Json(ws.view())))
}

/// PATCH /api/v1/workspaces/:id/subjects/:subject_id
pub async fn handle_update_subject(
    State(state): State<AppState>,
    Path((id, subject_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<SubjectUpdate>,
) -> Result<Json<WorkspaceView>, AppError> {
    let workspace = lookup(&state, id).await?;
    let mut ws = workspace.lock().await;
    ws.update_subject(subject_id, update)?;
    Ok(Json(ws.view()))
}

/// DELETE /api/v1/workspaces/:id/subjects/:subject_id
pub async fn handle_remove_subject(
    State(state): State<AppState>,
    Path((id, subject_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<WorkspaceView>, AppError> {
    let workspace = lookup(&state, id).await?;
    let mut ws = workspace.lock().await;
    ws.remove_subject(subject_id)?;
    Ok(Json(ws.view()))
}

/// POST /api/v1/workspaces/:id/submit
///
/// Recommendation failures and the subject-count check are reported through
/// the snapshot's `error` field, not the status code.
pub async fn handle_submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceView>, AppError> {
    let workspace = lookup(&state, id).await?;
    match state.orchestrator.submit(&workspace).await {
        Ok(()) | Err(WorkflowError::NotEnoughSubjects) => {}
        Err(e) => return Err(e.into()),
    }
    let view = workspace.lock().await.view();
    Ok(Json(view))
}

/// POST /api/v1/workspaces/:id/chat
///
/// The turn runs in its own task, so the transcript is completed even if the
/// client goes away mid-reply.
pub async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let workspace = lookup(&state, id).await?;
    let turn = state.orchestrator.start_chat(&workspace, &req.message).await?;

    let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        turn.run(&workspace, &tx).await;
        debug!(workspace_id = %id, "Chat turn finished");
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((reply_event(event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn reply_event(event: ReplyEvent) -> Result<Event, axum::Error> {
    let (name, text) = match event {
        ReplyEvent::Reply(text) => ("reply", text),
        ReplyEvent::Done(text) => ("done", text),
    };
    Event::default().event(name).json_data(json!({ "text": text }))
}

/// POST /api/v1/workspaces/:id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceView>, AppError> {
    let workspace = lookup(&state, id).await?;
    let mut ws = workspace.lock().await;
    ws.reset();
    Ok(Json(ws.view()))
}
