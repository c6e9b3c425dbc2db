use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    Json,
};
use tracing::info;

use crate::artifacts::{persist, ArtifactKind};
use crate::errors::{AppError, GenerationError};
use crate::models::GenerationRequest;
use crate::rubric::generator::{generate_rubric, RubricBrief};
use crate::state::AppState;
use crate::transport::stream_generation;

/// POST /api/v1/rubric/generate
pub async fn handle_generate_rubric(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let brief = RubricBrief::from(&request);
    if brief.is_empty() {
        return Err(AppError::Validation(
            "request must include a role or a user message".to_string(),
        ));
    }
    info!(
        "Rubric generation requested for {}",
        brief.role.as_deref().unwrap_or("an unnamed role")
    );

    let AppState { llm, artifacts, config, .. } = state;
    Ok(stream_generation(
        config.generation_budget,
        move |emitter, cancel| async move {
            let rubric = generate_rubric(llm.as_ref(), &brief, &emitter, &cancel).await?;
            let result = serde_json::to_value(&rubric)
                .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;
            persist(artifacts.as_ref(), ArtifactKind::Rubric, &result).await;
            Ok::<_, GenerationError>(result)
        },
    ))
}
