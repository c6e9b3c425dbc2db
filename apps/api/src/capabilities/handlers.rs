use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde_json::Value;
use tracing::info;

use crate::capabilities::{invoke, CapabilityState};
use crate::errors::{AppError, GenerationError};
use crate::state::AppState;
use crate::transport::{stream_generation, ProgressPayload};

/// POST /api/v1/capabilities/:name
///
/// Streams one capability's `loading` and terminal states, then completes
/// with the terminal state. A failed capability still completes normally.
pub async fn handle_invoke_capability(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(input) = payload?;
    let capability = state
        .capabilities
        .get_by_name(&name)
        .ok_or_else(|| AppError::NotFound(format!("unknown capability '{name}'")))?;

    info!("Direct invocation of {name}");
    Ok(stream_generation(
        state.config.generation_budget,
        move |emitter, cancel| async move {
            let mut states = invoke(capability.as_ref(), input, &cancel);
            let mut terminal = CapabilityState::Loading;
            while let Some(next) = states.next().await {
                emitter
                    .progress(ProgressPayload::step(1, 1, &name, &next))
                    .await?;
                terminal = next;
            }
            serde_json::to_value(&terminal)
                .map_err(|e| GenerationError::InvalidOutput(e.to_string()))
        },
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    use super::*;
    use crate::capabilities::compile::CompileContextCapability;
    use crate::capabilities::CapabilityRegistry;
    use crate::llm_client::testing::ScriptedModel;
    use crate::state::testing;
    use crate::transport::reader::{EventStreamReader, StreamFrame};
    use crate::transport::{ProgressDetail, StreamEvent};

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::empty();
        registry.register(std::sync::Arc::new(CompileContextCapability));
        registry
    }

    async fn frames(response: Response) -> Vec<StreamFrame> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        EventStreamReader::new().push(&bytes)
    }

    #[tokio::test]
    async fn test_streams_loading_then_ready() {
        let test = testing::build(ScriptedModel::new(Vec::<String>::new()), registry(), 10);
        let response = handle_invoke_capability(
            State(test.state),
            Path("compile_context".to_string()),
            Ok(Json(json!({"url": "https://acme.dev", "title": "Acme"}))),
        )
        .await
        .unwrap();

        let frames = frames(response).await;
        let statuses: Vec<String> = frames
            .iter()
            .filter_map(|f| match f {
                StreamFrame::Event(StreamEvent::Progress(p)) => match &p.detail {
                    ProgressDetail::Step(step) => Some(step.status.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec!["loading", "ready"]);
        match &frames[frames.len() - 2] {
            StreamFrame::Event(StreamEvent::Complete { result, .. }) => {
                assert_eq!(result["state"], "ready");
                assert_eq!(result["output"]["title"], "Acme");
            }
            other => panic!("expected complete, got {other:?}"),
        }
        assert_eq!(frames.last(), Some(&StreamFrame::Done));
    }

    #[tokio::test]
    async fn test_failed_capability_completes_with_failed_state() {
        let test = testing::build(ScriptedModel::new(Vec::<String>::new()), registry(), 10);
        let response = handle_invoke_capability(
            State(test.state),
            Path("compile_context".to_string()),
            Ok(Json(json!({"url": ""}))),
        )
        .await
        .unwrap();

        let frames = frames(response).await;
        let complete = frames.iter().find_map(|f| match f {
            StreamFrame::Event(StreamEvent::Complete { result, .. }) => Some(result.clone()),
            _ => None,
        });
        let result = complete.expect("stream should complete");
        assert_eq!(result["state"], "failed");
        assert_eq!(result["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_unknown_capability_is_not_found() {
        let test = testing::build(ScriptedModel::new(Vec::<String>::new()), registry(), 10);
        let err = handle_invoke_capability(
            State(test.state),
            Path("teleport".to_string()),
            Ok(Json(json!({}))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
