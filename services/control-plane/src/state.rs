//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::StateStore;
use crate::gameservers::GameserverService;
use crate::games::GameRegistry;
use crate::rpc::AgentService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: StateStore,
    gameservers: GameserverService,
    agents: AgentService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(store: StateStore, registry: Arc<GameRegistry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                gameservers: GameserverService::new(store.clone(), registry),
                agents: AgentService::new(store.clone()),
                store,
            }),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn gameservers(&self) -> &GameserverService {
        &self.inner.gameservers
    }

    pub fn agents(&self) -> &AgentService {
        &self.inner.agents
    }
}
