use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::artifacts::{persist, ArtifactKind};
use crate::capabilities::fetch::parse_http_url;
use crate::errors::{AppError, GenerationError};
use crate::models::GenerationRequest;
use crate::orchestrator::{LoopConfig, Orchestrator, COMPANY_RESEARCH, RUBRIC_SCAFFOLD};
use crate::state::AppState;
use crate::transport::stream_generation;

/// Brief handed to the decision policy: the caller's request plus any
/// company context it carried.
fn loop_brief(request: &GenerationRequest) -> Result<String, AppError> {
    let brief = request.brief();
    if brief.trim().is_empty() {
        return Err(AppError::Validation(
            "request must include a user message or a company, url or role".to_string(),
        ));
    }
    if let Some(url) = request.url() {
        parse_http_url(url).map_err(|e| AppError::Validation(e.message))?;
    }

    let context = request.context();
    if context.is_empty() {
        Ok(brief)
    } else {
        Ok(format!("{brief}\n\nCompany context:\n{}", context.describe()))
    }
}

/// Streams one loop run and stores its artifact once it finishes.
fn stream_loop(
    state: AppState,
    config: &'static LoopConfig,
    brief: String,
    company_name: Option<String>,
    artifact: ArtifactKind,
) -> Response {
    let AppState {
        llm,
        capabilities,
        artifacts,
        config: app_config,
        ..
    } = state;

    stream_generation(app_config.generation_budget, move |emitter, cancel| async move {
        let orchestrator = Orchestrator {
            llm: llm.as_ref(),
            registry: capabilities.as_ref(),
            config,
        };
        let outcome = orchestrator.run(&brief, company_name, &emitter, &cancel).await?;
        let result = serde_json::to_value(&outcome)
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        let stored = match artifact {
            ArtifactKind::CompanyContext => outcome
                .compiled_context
                .as_ref()
                .and_then(|ctx| serde_json::to_value(ctx).ok()),
            _ => Some(result.clone()),
        };
        if let Some(payload) = stored {
            persist(artifacts.as_ref(), artifact, &payload).await;
        }
        Ok::<Value, GenerationError>(result)
    })
}

/// POST /api/v1/research/company
pub async fn handle_research_company(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let brief = loop_brief(&request)?;
    let company_name = request.company_name().map(str::to_string);
    info!("Company research requested ({} chars of brief)", brief.len());

    Ok(stream_loop(
        state,
        &COMPANY_RESEARCH,
        brief,
        company_name,
        ArtifactKind::CompanyContext,
    ))
}

/// POST /api/v1/rubric/scaffold
pub async fn handle_rubric_scaffold(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let brief = loop_brief(&request)?;
    let company_name = request.company_name().map(str::to_string);
    info!("Rubric scaffold requested ({} chars of brief)", brief.len());

    Ok(stream_loop(
        state,
        &RUBRIC_SCAFFOLD,
        brief,
        company_name,
        ArtifactKind::RubricScaffold,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use serde_json::json;

    use super::*;
    use crate::capabilities::compile::CompileContextCapability;
    use crate::capabilities::scaffold::{RubricScaffoldCapability, ScaffoldKind};
    use crate::capabilities::CapabilityRegistry;
    use crate::llm_client::testing::ScriptedModel;
    use crate::state::testing;
    use crate::transport::reader::{EventStreamReader, StreamFrame};
    use crate::transport::StreamEvent;

    fn scaffold_registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::empty();
        registry.register(Arc::new(RubricScaffoldCapability::new(ScaffoldKind::JobFit)));
        registry.register(Arc::new(CompileContextCapability));
        registry
    }

    fn request(value: Value) -> Result<Json<GenerationRequest>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[test]
    fn test_brief_requires_content() {
        let empty: GenerationRequest = serde_json::from_value(json!({"messages": []})).unwrap();
        assert!(matches!(loop_brief(&empty), Err(AppError::Validation(_))));

        let bad_url: GenerationRequest =
            serde_json::from_value(json!({"url": "ftp://acme.dev", "role": "SRE"})).unwrap();
        assert!(matches!(loop_brief(&bad_url), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_brief_carries_company_context() {
        let req: GenerationRequest = serde_json::from_value(json!({
            "role": "Data Engineer",
            "context": {"industry": "Fintech", "culture": {"values": ["Integrity"]}}
        }))
        .unwrap();
        let brief = loop_brief(&req).unwrap();
        assert!(brief.contains("Role: Data Engineer"));
        assert!(brief.contains("Fintech"));
    }

    #[tokio::test]
    async fn test_scaffold_run_streams_and_stores_outcome() {
        let llm = ScriptedModel::new([
            r#"{"type":"capability","name":"job_fit_rubric","input":{"subject":"Data Engineer","attributes":["SQL"]}}"#,
            r#"{"type":"final","answer":{"attributes":[{"name":"SQL","category":"SKILL"}]}}"#,
        ]);
        let test = testing::build(llm, scaffold_registry(), 10);
        let artifacts = Arc::clone(&test.artifacts);

        let response = handle_rubric_scaffold(
            State(test.state),
            request(json!({"role": "Data Engineer"})),
        )
        .await
        .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let frames = EventStreamReader::new().push(&bytes);

        assert_eq!(frames.first(), Some(&StreamFrame::Event(StreamEvent::Start)));
        assert_eq!(frames.last(), Some(&StreamFrame::Done));
        let result = frames
            .iter()
            .find_map(|f| match f {
                StreamFrame::Event(StreamEvent::Complete { result, .. }) => Some(result.clone()),
                _ => None,
            })
            .expect("run should complete");
        assert_eq!(result["steps"].as_array().unwrap().len(), 1);
        assert_eq!(result["attributes"][0]["name"], "SQL");
        assert_eq!(result["stepCeilingReached"], false);

        let saved = artifacts.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, ArtifactKind::RubricScaffold);
    }
}
