//! compile_context: pure projection of upstream outputs into a compact blob.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capabilities::detect::{StackBreakdown, TechnologySignal};
use crate::capabilities::extract::{collapse_whitespace, truncate_chars};
use crate::capabilities::{
    parse_input, schema_of, Capability, CapabilityError, CapabilityErrorKind, CapabilityKind,
    CapabilityResult,
};

pub const MAX_PREVIEW_CHARS: usize = 1200;
pub const MAX_CONTEXT_LINKS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompileContextInput {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Extracted page text; trimmed to 1200 characters.
    #[serde(default)]
    pub text_preview: Option<String>,
    #[serde(default)]
    pub stack: Option<StackBreakdown>,
    #[serde(default)]
    pub signals: Option<Vec<TechnologySignal>>,
    #[serde(default)]
    pub links: Option<Vec<String>>,
    /// Fixed timestamp for reproducible output; defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledContext {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content_preview: String,
    pub stack_breakdown: StackBreakdown,
    pub signals: Vec<TechnologySignal>,
    pub links: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Deterministic given `input` and `now`.
pub fn compile_context(input: CompileContextInput, now: DateTime<Utc>) -> CompiledContext {
    let mut links: Vec<String> = Vec::new();
    for link in input.links.unwrap_or_default() {
        let link = link.trim().to_string();
        if !link.is_empty() && !links.contains(&link) {
            links.push(link);
        }
        if links.len() == MAX_CONTEXT_LINKS {
            break;
        }
    }

    CompiledContext {
        url: input.url.trim().to_string(),
        title: clean(input.title),
        description: clean(input.description),
        content_preview: truncate_chars(&clean(input.text_preview), MAX_PREVIEW_CHARS)
            .trim_end()
            .to_string(),
        stack_breakdown: input.stack.unwrap_or_default(),
        signals: input.signals.unwrap_or_default(),
        links,
        timestamp: input.timestamp.unwrap_or(now),
    }
}

fn clean(text: Option<String>) -> String {
    text.map(|t| collapse_whitespace(&t)).unwrap_or_default()
}

pub struct CompileContextCapability;

#[async_trait]
impl Capability for CompileContextCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::CompileContext
    }

    fn description(&self) -> &'static str {
        "Compile fetched page data, detected stack and signals into a compact context record (no network access)"
    }

    fn input_schema(&self) -> Value {
        schema_of::<CompileContextInput>()
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> CapabilityResult {
        let input: CompileContextInput = parse_input(input)?;
        if input.url.trim().is_empty() {
            return Err(CapabilityError::invalid_input("url cannot be empty"));
        }
        serde_json::to_value(compile_context(input, Utc::now()))
            .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}
