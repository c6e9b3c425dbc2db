//! Capability Set: self-contained units of work the orchestrator can invoke.
//!
//! Every capability returns a tagged `CapabilityResult`; callers observe it as
//! a three-state stream (`loading` then exactly one of `ready` / `failed`)
//! through [`invoke`]. Panics inside a capability become `failed`.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm_client::cache::ResponseCache;
use crate::llm_client::{LanguageModel, LlmError};

pub mod compile;
pub mod detect;
pub mod extract;
pub mod fetch;
pub mod handlers;
pub mod prompts;
pub mod scaffold;
pub mod search;
pub mod synthesize;

use compile::CompileContextCapability;
use detect::DetectStackCapability;
use fetch::FetchPageCapability;
use scaffold::{RubricScaffoldCapability, ScaffoldKind};
use search::{SearchConfig, WebSearchCapability};
use synthesize::SynthesizeCapability;

// ────────────────────────────────────────────────────────────────────────────
// Kinds, states and errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    FetchPage,
    DetectStack,
    CompileContext,
    Synthesize,
    WebSearch,
    JobFitRubric,
    CompanyFitRubric,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 7] = [
        CapabilityKind::FetchPage,
        CapabilityKind::DetectStack,
        CapabilityKind::CompileContext,
        CapabilityKind::Synthesize,
        CapabilityKind::WebSearch,
        CapabilityKind::JobFitRubric,
        CapabilityKind::CompanyFitRubric,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CapabilityKind::FetchPage => "fetch_page",
            CapabilityKind::DetectStack => "detect_stack",
            CapabilityKind::CompileContext => "compile_context",
            CapabilityKind::Synthesize => "synthesize",
            CapabilityKind::WebSearch => "web_search",
            CapabilityKind::JobFitRubric => "job_fit_rubric",
            CapabilityKind::CompanyFitRubric => "company_fit_rubric",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityErrorKind {
    InvalidInput,
    Network,
    Upstream,
    Configuration,
    UnknownCapability,
    Cancelled,
    Internal,
}

/// Structured failure carried by the `failed` state.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::InvalidInput, message)
    }

    pub fn cancelled() -> Self {
        Self::new(CapabilityErrorKind::Cancelled, "request was cancelled")
    }
}

impl From<LlmError> for CapabilityError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => CapabilityError::cancelled(),
            other => CapabilityError::new(CapabilityErrorKind::Upstream, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(err: reqwest::Error) -> Self {
        CapabilityError::new(CapabilityErrorKind::Network, err.to_string())
    }
}

pub type CapabilityResult = Result<Value, CapabilityError>;

/// Observable state of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapabilityState {
    Loading,
    Ready { output: Value },
    Failed { error: CapabilityError },
}

impl CapabilityState {
    pub fn status(&self) -> &'static str {
        match self {
            CapabilityState::Loading => "loading",
            CapabilityState::Ready { .. } => "ready",
            CapabilityState::Failed { .. } => "failed",
        }
    }
}

impl From<CapabilityResult> for CapabilityState {
    fn from(result: CapabilityResult) -> Self {
        match result {
            Ok(output) => CapabilityState::Ready { output },
            Err(error) => CapabilityState::Failed { error },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// One-line description surfaced to the decision policy.
    fn description(&self) -> &'static str;

    /// JSON schema of the accepted input record.
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> CapabilityResult;
}

/// Runs a capability as a three-state stream: `Loading` is yielded before any
/// work starts, followed by exactly one terminal state.
pub fn invoke<'a>(
    capability: &'a dyn Capability,
    input: Value,
    cancel: &'a CancellationToken,
) -> BoxStream<'a, CapabilityState> {
    let terminal = async move {
        if cancel.is_cancelled() {
            return CapabilityState::Failed {
                error: CapabilityError::cancelled(),
            };
        }
        match AssertUnwindSafe(capability.execute(input, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => CapabilityState::from(result),
            Err(_) => {
                tracing::error!("capability {} panicked", capability.kind().name());
                CapabilityState::Failed {
                    error: CapabilityError::new(
                        CapabilityErrorKind::Internal,
                        "capability crashed while running",
                    ),
                }
            }
        }
    };

    stream::once(async { CapabilityState::Loading })
        .chain(stream::once(terminal))
        .boxed()
}

/// Drains [`invoke`] and returns the terminal state.
#[cfg(test)]
pub async fn invoke_to_completion(
    capability: &dyn Capability,
    input: Value,
    cancel: &CancellationToken,
) -> CapabilityState {
    let mut states = invoke(capability, input, cancel);
    let mut last = CapabilityState::Loading;
    while let Some(state) = states.next().await {
        last = state;
    }
    last
}

/// Validates a raw input record against the capability's typed contract.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, CapabilityError> {
    serde_json::from_value(input).map_err(|e| CapabilityError::invalid_input(e.to_string()))
}

pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Races `fut` against the run's cancellation token.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(CapabilityError::cancelled()),
        result = fut => result,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// Shared collaborators handed to capabilities at construction.
#[derive(Clone)]
pub struct CapabilityDeps {
    pub http: reqwest::Client,
    pub llm: Arc<dyn LanguageModel>,
    pub cache: Arc<ResponseCache>,
    pub search: SearchConfig,
}

pub struct CapabilityRegistry {
    capabilities: BTreeMap<CapabilityKind, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn empty() -> Self {
        Self {
            capabilities: BTreeMap::new(),
        }
    }

    /// Registers every capability kind.
    pub fn standard(deps: CapabilityDeps) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FetchPageCapability::new(
            deps.http.clone(),
            Arc::clone(&deps.llm),
            Arc::clone(&deps.cache),
        )));
        registry.register(Arc::new(DetectStackCapability::new(deps.http.clone())));
        registry.register(Arc::new(CompileContextCapability));
        registry.register(Arc::new(SynthesizeCapability::new(Arc::clone(&deps.llm))));
        registry.register(Arc::new(WebSearchCapability::new(deps.http, deps.search)));
        registry.register(Arc::new(RubricScaffoldCapability::new(ScaffoldKind::JobFit)));
        registry.register(Arc::new(RubricScaffoldCapability::new(
            ScaffoldKind::CompanyFit,
        )));
        registry
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.insert(capability.kind(), capability);
    }

    pub fn get(&self, kind: CapabilityKind) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(&kind).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Capability>> {
        CapabilityKind::from_name(name).and_then(|kind| self.get(kind))
    }

    /// Prompt block describing the allowed capabilities and their input schemas.
    pub fn describe(&self, allowed: &[CapabilityKind]) -> String {
        let mut out = String::new();
        for kind in allowed {
            if let Some(capability) = self.capabilities.get(kind) {
                out.push_str(&format!(
                    "- {}: {} (input schema: {})\n",
                    kind.name(),
                    capability.description(),
                    serde_json::to_string(&capability.input_schema()).unwrap_or_default()
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::CompileContext
        }
        fn description(&self) -> &'static str {
            "echo"
        }
        fn input_schema(&self) -> Value {
            Value::Null
        }
        async fn execute(&self, input: Value, _cancel: &CancellationToken) -> CapabilityResult {
            if input.get("boom").is_some() {
                panic!("boom");
            }
            Ok(input)
        }
    }

    #[tokio::test]
    async fn test_invoke_yields_loading_then_ready() {
        let cancel = CancellationToken::new();
        let states: Vec<_> = invoke(&Echo, serde_json::json!({"a": 1}), &cancel)
            .collect()
            .await;
        assert_eq!(states.len(), 2);
        assert_eq!(states[0], CapabilityState::Loading);
        assert_eq!(
            states[1],
            CapabilityState::Ready {
                output: serde_json::json!({"a": 1})
            }
        );
    }

    #[tokio::test]
    async fn test_panicking_capability_becomes_failed() {
        let cancel = CancellationToken::new();
        let states: Vec<_> = invoke(&Echo, serde_json::json!({"boom": true}), &cancel)
            .collect()
            .await;
        assert_eq!(states.len(), 2);
        match &states[1] {
            CapabilityState::Failed { error } => {
                assert_eq!(error.kind, CapabilityErrorKind::Internal)
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_fails_without_executing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let state = invoke_to_completion(&Echo, serde_json::json!({"boom": true}), &cancel).await;
        assert!(matches!(
            state,
            CapabilityState::Failed { ref error } if error.kind == CapabilityErrorKind::Cancelled
        ));
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(CapabilityKind::from_name("delete_database"), None);
    }

    #[test]
    fn test_state_serializes_with_state_tag() {
        let failed = CapabilityState::Failed {
            error: CapabilityError::invalid_input("url is required"),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"]["kind"], "invalid_input");
    }
}
