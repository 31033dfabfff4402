//! HTTP API
//!
//! The chat stream endpoint plus the chat and message CRUD the client uses.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::auth::Authenticator;
use crate::graph::AgentGraph;
use crate::store::Storage;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub graph: AgentGraph,
    pub store: Arc<dyn Storage>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(graph: AgentGraph, store: Arc<dyn Storage>, auth: Arc<dyn Authenticator>) -> Self {
        Self { graph, store, auth }
    }
}
