use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::workflow::workspace::Workspace;

pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// In-memory workspaces keyed by id. Nothing is persisted.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    workspaces: Arc<RwLock<HashMap<Uuid, SharedWorkspace>>>,
    idle_ttl: Duration,
}

impl WorkspaceRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            workspaces: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Creates a fresh workspace, evicting idle ones first.
    pub async fn create(&self) -> SharedWorkspace {
        let mut workspaces = self.workspaces.write().await;
        evict_idle(&mut workspaces, self.idle_ttl);

        let workspace = Workspace::new();
        let id = workspace.id();
        let shared = Arc::new(Mutex::new(workspace));
        workspaces.insert(id, shared.clone());
        info!(workspace_id = %id, "Workspace created ({} live)", workspaces.len());
        shared
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedWorkspace> {
        self.workspaces.read().await.get(&id).cloned()
    }

    /// Removes the workspace and cancels anything still running for it.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.workspaces.write().await.remove(&id);
        match removed {
            Some(workspace) => {
                workspace.lock().await.reset();
                info!(workspace_id = %id, "Workspace closed");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.workspaces.read().await.len()
    }
}

/// Busy workspaces (lock held) are kept for the next round.
fn evict_idle(workspaces: &mut HashMap<Uuid, SharedWorkspace>, ttl: Duration) {
    let cutoff = Utc::now() - ttl;
    workspaces.retain(|id, workspace| match workspace.try_lock() {
        Ok(mut ws) if ws.last_active() < cutoff => {
            ws.reset();
            info!(workspace_id = %id, "Evicting idle workspace");
            false
        }
        _ => true,
    });
}
