mod config;
mod document;
mod errors;
mod llm_client;
mod routes;
mod sessions;
mod state;
mod tailoring;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::sessions::{spawn_purge_task, ArtifactStore, SessionStore};
use crate::state::AppState;

/// How often expired sessions and their artifacts are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Work directory for exported artifacts
    let artifacts = ArtifactStore::new(config.work_dir.clone());
    std::fs::create_dir_all(artifacts.dir()).with_context(|| {
        format!("Failed to create work dir {}", artifacts.dir().display())
    })?;
    info!("Artifacts stored in {}", artifacts.dir().display());

    // Session store with periodic expiry sweep
    let sessions = SessionStore::new(chrono::Duration::minutes(config.session_ttl_minutes));
    spawn_purge_task(sessions.clone(), artifacts.clone(), PURGE_INTERVAL);
    info!(
        "Sessions expire after {} minutes; append policy {:?}",
        config.session_ttl_minutes, config.append_policy
    );

    // Build app state
    let state = AppState {
        llm: Arc::new(llm),
        sessions,
        artifacts,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
