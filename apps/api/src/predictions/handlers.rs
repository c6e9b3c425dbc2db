use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub output: Value,
}

/// POST /api/v1/predictions
pub async fn handle_predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let Json(req) = payload?;
    let client = state.predictions.as_ref().ok_or_else(|| {
        AppError::Configuration("PREDICTION_API_URL is not configured".to_string())
    })?;

    // Cancelled when this future is dropped, e.g. on client disconnect, so a
    // pending backoff sleep ends with it.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let output = client.predict(&req.input, &cancel).await?;
    Ok(Json(PredictionResponse { output }))
}
