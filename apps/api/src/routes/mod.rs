pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::tailoring::handlers;

/// Upload ceiling for the analyze endpoint (resume file plus job description).
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Tailoring API
        .route("/api/v1/tailor/analyze", post(handlers::handle_analyze))
        .route("/api/v1/tailor/generate", post(handlers::handle_generate))
        .route(
            "/api/v1/tailor/sessions/:id/preview",
            get(handlers::handle_preview),
        )
        .route(
            "/api/v1/tailor/download/:artifact",
            get(handlers::handle_download),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
