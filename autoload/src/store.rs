//! Workspace store interface
//!
//! The workspace is owned by an external reactive store. The orchestrator
//! reads a few facts from it, applies environment updates through a
//! synchronous [`WorkspaceStore::commit`], and imports the collection batch
//! through an asynchronous [`WorkspaceStore::dispatch`].

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::types::{node_count, CollectionItem, Environment, Plugin};

/// Direct state mutations
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SetEnvironments(Vec<Environment>),
}

/// Composite store operations
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ImportCollections {
        items: Vec<CollectionItem>,
        plugins: Vec<Plugin>,
    },
}

/// Result of a dispatched action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    fn workspace_id(&self) -> String;

    /// Whether the collection tree already has at least one node
    fn has_collection_data(&self) -> bool;

    fn environments(&self) -> Vec<Environment>;

    fn commit(&self, mutation: Mutation);

    async fn dispatch(&self, action: Action) -> DispatchOutcome;
}

// ============================================================================
// In-memory workspace
// ============================================================================

/// Serializable view of a workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    pub workspace_id: String,
    pub collections: Vec<CollectionItem>,
    pub plugins: Vec<Plugin>,
    pub environments: Vec<Environment>,
}

/// Store backed by a mutex-guarded snapshot, for the CLI and tests
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    state: Mutex<WorkspaceSnapshot>,
    reject_with: Option<String>,
}

impl InMemoryWorkspace {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(WorkspaceSnapshot {
                workspace_id: workspace_id.into(),
                ..Default::default()
            }),
            reject_with: None,
        }
    }

    pub fn with_collections(self, collections: Vec<CollectionItem>) -> Self {
        self.update(|state| state.collections = collections);
        self
    }

    pub fn with_environments(self, environments: Vec<Environment>) -> Self {
        self.update(|state| state.environments = environments);
        self
    }

    /// Make every dispatch fail with `message`
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.reject_with = Some(message.into());
        self
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.read(Clone::clone)
    }

    fn read<T>(&self, f: impl FnOnce(&WorkspaceSnapshot) -> T) -> T {
        // A poisoned lock still holds consistent data: every write is a single assignment
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn update(&self, f: impl FnOnce(&mut WorkspaceSnapshot)) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspace {
    fn workspace_id(&self) -> String {
        self.read(|s| s.workspace_id.clone())
    }

    fn has_collection_data(&self) -> bool {
        self.read(|s| node_count(&s.collections) > 0)
    }

    fn environments(&self) -> Vec<Environment> {
        self.read(|s| s.environments.clone())
    }

    fn commit(&self, mutation: Mutation) {
        match mutation {
            Mutation::SetEnvironments(environments) => {
                debug!(count = environments.len(), "Committing environments");
                self.update(|s| s.environments = environments);
            }
        }
    }

    async fn dispatch(&self, action: Action) -> DispatchOutcome {
        if let Some(message) = &self.reject_with {
            return DispatchOutcome::failed(message.clone());
        }
        match action {
            Action::ImportCollections { items, plugins } => {
                debug!(roots = items.len(), plugins = plugins.len(), "Importing collections");
                self.update(|s| {
                    s.collections.extend(items);
                    s.plugins.extend(plugins);
                });
                DispatchOutcome::ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestSpec;

    #[tokio::test]
    async fn test_dispatch_appends_collections() {
        let store = InMemoryWorkspace::new("ws-1");
        assert!(!store.has_collection_data());

        let outcome = store
            .dispatch(Action::ImportCollections {
                items: vec![CollectionItem::request(
                    Some("r".into()),
                    "Ping",
                    RequestSpec::default(),
                )],
                plugins: vec![],
            })
            .await;

        assert_eq!(outcome, DispatchOutcome::ok());
        assert!(store.has_collection_data());
        assert_eq!(store.snapshot().workspace_id, "ws-1");
    }

    #[tokio::test]
    async fn test_rejecting_store() {
        let store = InMemoryWorkspace::new("ws").rejecting("quota exceeded");
        let outcome = store
            .dispatch(Action::ImportCollections { items: vec![], plugins: vec![] })
            .await;
        assert_eq!(outcome.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_commit_replaces_environments() {
        let store = InMemoryWorkspace::new("ws").with_environments(vec![Environment::new("Old")]);
        store.commit(Mutation::SetEnvironments(vec![Environment::new("New")]));
        assert_eq!(store.environments(), vec![Environment::new("New")]);
    }
}
