mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use autojudge_common::config::Config;
use autojudge_common::store::{self, QuestionStore};
use autojudge_engine::{provider, ExecutionProvider, OllamaGenerator, RepairLoop};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub store: Arc<dyn QuestionStore>,
    pub executor: Arc<dyn ExecutionProvider>,
    pub repair: RepairLoop,
}

impl AppState {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        executor: Arc<dyn ExecutionProvider>,
        repair: RepairLoop,
    ) -> Self {
        Self { store, executor, repair }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("AutoJudge API booting...");

    let config = Config::from_env().context("Invalid configuration")?;

    let store = store::connect(&config).await?;
    let executor = provider::from_config(&config)?;
    let generator = Arc::new(OllamaGenerator::from_config(&config)?);
    info!(
        generator_url = %config.generator_url,
        model = %config.generator_model,
        max_attempts = config.max_attempts,
        "Code generator configured"
    );

    let repair = RepairLoop::new(Arc::clone(&store), generator, Arc::clone(&executor))
        .with_max_attempts(config.max_attempts);

    let state = Arc::new(AppState::new(store, executor, repair));

    let app = routes::routes().with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
