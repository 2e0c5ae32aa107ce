use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::llm_client::GenerativeModel;
use crate::workflow::{Orchestrator, WorkspaceRegistry};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub workspaces: WorkspaceRegistry,
    pub config: Config,
}

impl AppState {
    /// `model` is the Gemini client in production and a scripted model in tests.
    pub fn new(model: Arc<dyn GenerativeModel>, config: Config) -> Self {
        Self {
            orchestrator: Orchestrator::new(model),
            workspaces: WorkspaceRegistry::new(Duration::minutes(config.workspace_idle_ttl_mins)),
            config,
        }
    }
}
