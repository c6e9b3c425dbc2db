//! Delegated prediction execution against an external inference endpoint.
//!
//! Hosted models scale to zero; the first calls after idle answer `503` with
//! a "loading" body. Those are retried on [`Backoff::COLD_START`], everything
//! else is returned as-is.

pub mod handlers;

use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::retry::{retry_with_backoff, Backoff, RetryError};

/// Seconds a caller is told to wait once the cold-start schedule is spent.
pub const WARM_UP_RETRY_AFTER_SECS: u64 = 30;

const COLD_START_MARKERS: [&str; 3] = ["loading", "initializing", "starting"];

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("model is cold-starting: {0}")]
    ColdStart(String),

    #[error("prediction endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prediction was cancelled")]
    Cancelled,
}

impl PredictionError {
    fn is_transient(&self) -> bool {
        matches!(self, PredictionError::ColdStart(_))
    }
}

/// `503` whose body says the model is still coming up.
pub fn is_cold_start(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::SERVICE_UNAVAILABLE {
        return false;
    }
    let body = body.to_lowercase();
    COLD_START_MARKERS.iter().any(|marker| body.contains(marker))
}

pub struct PredictionClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    backoff: Backoff,
}

impl PredictionClient {
    pub fn new(http: reqwest::Client, url: String, token: Option<String>) -> Self {
        Self {
            http,
            url,
            token,
            backoff: Backoff::COLD_START,
        }
    }

    async fn attempt(&self, input: &Value) -> Result<Value, PredictionError> {
        let mut request = self.http.post(&self.url).json(&json!({ "input": input }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await?;
            // Some endpoints wrap the result, others return it bare.
            return Ok(match body {
                Value::Object(mut map) if map.contains_key("output") => {
                    map.remove("output").unwrap_or(Value::Null)
                }
                other => other,
            });
        }

        let body = response.text().await.unwrap_or_default();
        if is_cold_start(status, &body) {
            Err(PredictionError::ColdStart(body))
        } else {
            Err(PredictionError::Upstream {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Runs one prediction, retrying while the model cold-starts.
    pub async fn predict(
        &self,
        input: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, PredictionError> {
        let result = retry_with_backoff(
            &self.backoff,
            cancel,
            |attempt| {
                debug!("prediction attempt {}", attempt + 1);
                self.attempt(input)
            },
            PredictionError::is_transient,
        )
        .await;

        match result {
            Ok(output) => Ok(output),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => {
                info!("prediction still cold after {attempts} attempts");
                Err(last)
            }
            Err(RetryError::Cancelled) => Err(PredictionError::Cancelled),
        }
    }
}

impl From<PredictionError> for AppError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::ColdStart(_) => AppError::ModelWarmingUp {
                retry_after_secs: WARM_UP_RETRY_AFTER_SECS,
            },
            other => AppError::Upstream(other.to_string()),
        }
    }
}
