pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;
use crate::workflow::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/subjects/common", get(handlers::handle_common_subjects))
        // Workspaces
        .route("/api/v1/workspaces", post(handlers::handle_create_workspace))
        .route(
            "/api/v1/workspaces/:id",
            get(handlers::handle_get_workspace).delete(handlers::handle_delete_workspace),
        )
        .route(
            "/api/v1/workspaces/:id/subjects",
            post(handlers::handle_add_subject),
        )
        .route(
            "/api/v1/workspaces/:id/subjects/:subject_id",
            patch(handlers::handle_update_subject).delete(handlers::handle_remove_subject),
        )
        .route("/api/v1/workspaces/:id/submit", post(handlers::handle_submit))
        .route("/api/v1/workspaces/:id/chat", post(handlers::handle_chat))
        .route("/api/v1/workspaces/:id/reset", post(handlers::handle_reset))
        .with_state(state)
}
