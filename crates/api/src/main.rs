mod config;
mod metrics;
mod retry;
mod routes;

use anyhow::{Context, Result};
use detect::{ChatCompletionsClient, CompletionBackend, Pipeline, PipelineConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::retry::{RetryPolicy, RetryingBackend};
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing();
    tracing::info!(
        config = %serde_json::to_string(&config).unwrap_or_default(),
        "Loaded configuration"
    );

    let client = ChatCompletionsClient::new(
        config.backend.base_url.clone(),
        config.backend.api_key.clone(),
        config.backend.analysis_model.clone(),
        config.backend.classification_model.clone(),
    );

    let mut backend: Arc<dyn CompletionBackend> = Arc::new(client);
    let policy = RetryPolicy::from_config(&config.retry);
    if policy.is_enabled() {
        backend = Arc::new(RetryingBackend::new(backend, policy));
    }

    let pipeline = Pipeline::new(
        backend,
        PipelineConfig {
            request_timeout: config.request_timeout(),
        },
    );

    let app = routes::router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// `RUST_LOG` controls verbosity; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
