pub mod health;

use axum::{
    extract::State,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::capabilities::handlers::handle_invoke_capability;
use crate::orchestrator::handlers::{handle_research_company, handle_rubric_scaffold};
use crate::predictions::handlers::handle_predict;
use crate::rate_limit::enforce_rate_limit;
use crate::rubric::handlers::handle_generate_rubric;
use crate::state::AppState;

/// DELETE /api/v1/cache
async fn handle_clear_cache(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.cache.clear().await;
    info!("Response cache cleared ({cleared} entries)");
    Json(json!({ "cleared": cleared }))
}

pub fn build_router(state: AppState) -> Router {
    // Every route that starts model or capability work is metered.
    let generation = Router::new()
        .route("/api/v1/research/company", post(handle_research_company))
        .route("/api/v1/rubric/scaffold", post(handle_rubric_scaffold))
        .route("/api/v1/rubric/generate", post(handle_generate_rubric))
        .route("/api/v1/capabilities/:name", post(handle_invoke_capability))
        .route("/api/v1/predictions", post(handle_predict))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/cache", delete(handle_clear_cache))
        .merge(generation)
        .with_state(state)
}
