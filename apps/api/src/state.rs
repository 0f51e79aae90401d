use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmCompletion;
use crate::sessions::{ArtifactStore, SessionStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Completion backend. Production: `LlmClient`; tests script responses.
    pub llm: Arc<dyn LlmCompletion>,
    pub sessions: SessionStore,
    pub artifacts: ArtifactStore,
    pub config: Config,
}
