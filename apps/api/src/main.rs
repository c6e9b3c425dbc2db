mod artifacts;
mod capabilities;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod orchestrator;
mod predictions;
mod rate_limit;
mod retry;
mod routes;
mod rubric;
mod state;
mod transport;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::artifacts::{ArtifactStore, LogArtifactStore, PgArtifactStore};
use crate::capabilities::search::SearchConfig;
use crate::capabilities::{CapabilityDeps, CapabilityRegistry};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::cache::ResponseCache;
use crate::llm_client::{LanguageModel, LlmClient};
use crate::predictions::PredictionClient;
use crate::rate_limit::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hiring engine v{}", env!("CARGO_PKG_VERSION"));

    // Artifact store: PostgreSQL when configured, log-only otherwise
    let artifacts: Arc<dyn ArtifactStore> = match &config.database_url {
        Some(url) => Arc::new(PgArtifactStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set, generated artifacts will only be logged");
            Arc::new(LogArtifactStore)
        }
    };

    // Rate limiter: Redis when configured, in-process otherwise
    let window = Duration::from_secs(config.rate_limit_window_secs);
    let rate_limiter: Arc<dyn RateLimiter> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis rate limiter initialized");
            Arc::new(RedisRateLimiter::new(
                client,
                config.rate_limit_max_requests,
                window,
            ))
        }
        None => {
            warn!("REDIS_URL not set, rate limits are tracked per process");
            Arc::new(InMemoryRateLimiter::new(
                config.rate_limit_max_requests,
                window,
            ))
        }
    };

    // Initialize LLM client and the process-wide response cache
    let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    let cache = Arc::new(ResponseCache::new());

    let http = reqwest::Client::builder()
        .user_agent(concat!("hiring-engine/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let capabilities = Arc::new(CapabilityRegistry::standard(CapabilityDeps {
        http: http.clone(),
        llm: Arc::clone(&llm),
        cache: Arc::clone(&cache),
        search: SearchConfig {
            api_url: config.search_api_url.clone(),
            api_key: config.search_api_key.clone(),
        },
    }));

    let predictions = config.prediction_api_url.clone().map(|url| {
        info!("Prediction endpoint configured");
        Arc::new(PredictionClient::new(
            http.clone(),
            url,
            config.prediction_api_token.clone(),
        ))
    });

    // Build app state
    let state = AppState {
        llm,
        capabilities,
        cache,
        rate_limiter,
        artifacts,
        predictions,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the rate limiter when no forwarding header is present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
